//! Host 模块单元测试
//!
//! 覆盖闸门、消息通道和生命周期控制器
