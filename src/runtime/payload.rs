//! Opaque message payloads.
//!
//! The host and the embedded program agree on payload layout out-of-band
//! through the message type tag; the channel itself never inspects payloads.

use std::ffi::c_void;

/// Untyped pointer carried through the message channel.
///
/// This is the single boundary type for the embedding's untyped data
/// contract. For synchronous sends the pointed-to value stays owned by the
/// blocked caller and may be reclaimed as soon as the send returns. For
/// asynchronous sends the caller must keep it valid until the completion
/// hook fires (or apply its own reclamation policy when no hook was given).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpaquePayload {
    ptr: *mut c_void,
}

// Dispatch is serialized on the worker thread; a sync sender blocks for the
// duration of the dereference and an async sender contracts to keep the
// pointee alive, so moving the raw pointer between threads is part of the
// documented protocol.
unsafe impl Send for OpaquePayload {}

impl OpaquePayload {
    /// The null payload.
    #[inline]
    pub fn null() -> Self {
        Self {
            ptr: std::ptr::null_mut(),
        }
    }

    /// Wrap a raw pointer.
    #[inline]
    pub fn from_ptr<T>(ptr: *mut T) -> Self {
        Self {
            ptr: ptr as *mut c_void,
        }
    }

    /// Wrap a shared reference. The pointee must outlive every dereference
    /// on the worker thread; a blocking sync send guarantees that window.
    #[inline]
    pub fn from_ref<T>(value: &T) -> Self {
        Self {
            ptr: value as *const T as *mut c_void,
        }
    }

    /// Wrap an exclusive reference, allowing the handler to mutate through it.
    #[inline]
    pub fn from_mut<T>(value: &mut T) -> Self {
        Self {
            ptr: value as *mut T as *mut c_void,
        }
    }

    /// Transfer ownership of a heap value into the payload.
    ///
    /// Pair with [`OpaquePayload::into_box`] on the receiving side (or in a
    /// completion hook) to reclaim it.
    #[inline]
    pub fn from_box<T>(value: Box<T>) -> Self {
        Self {
            ptr: Box::into_raw(value) as *mut c_void,
        }
    }

    /// Whether this is the null payload.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    /// The raw pointer, cast to `T`.
    #[inline]
    pub fn as_ptr<T>(&self) -> *mut T {
        self.ptr as *mut T
    }

    /// Borrow the pointee.
    ///
    /// # Safety
    /// The payload must point to a live, properly aligned `T` (the type
    /// agreed for this message tag) for the duration of the borrow.
    #[inline]
    pub unsafe fn as_ref<'a, T>(&self) -> Option<&'a T> {
        (self.ptr as *const T).as_ref()
    }

    /// Mutably borrow the pointee.
    ///
    /// # Safety
    /// Same requirements as [`OpaquePayload::as_ref`], plus exclusivity: no
    /// other reference to the pointee may be live.
    #[inline]
    pub unsafe fn as_mut<'a, T>(&self) -> Option<&'a mut T> {
        (self.ptr as *mut T).as_mut()
    }

    /// Take back ownership of a heap value previously passed with
    /// [`OpaquePayload::from_box`]. Returns `None` for the null payload.
    ///
    /// # Safety
    /// The payload must carry a pointer produced by `from_box::<T>` that has
    /// not been reclaimed yet.
    #[inline]
    pub unsafe fn into_box<T>(self) -> Option<Box<T>> {
        if self.ptr.is_null() {
            None
        } else {
            Some(Box::from_raw(self.ptr as *mut T))
        }
    }
}

impl Default for OpaquePayload {
    fn default() -> Self {
        Self::null()
    }
}
