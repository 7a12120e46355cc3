//! A contiguous block of PCM samples with explicit memory ownership.
//!
//! Buffers are shared between graph endpoints as `Arc<Buffer>`. They carry
//! no internal synchronisation: within one block cycle a buffer has a single
//! writer (the producing node) which finishes before any reader observes the
//! buffer. All mutation goes through `&self` and raw pointer writes so the
//! same handle can be published to many consumers.

use crate::{Sample, fault, pcm};

/// A fixed-size block of [`Sample`]s.
///
/// Two modes exist:
///
/// - *owned*: the buffer allocates zero-initialised storage and frees it
///   when the last handle drops.
/// - *borrowed*: the buffer wraps memory supplied by an external caller,
///   e.g. an audio driver's per-callback buffer, and never frees it.
pub struct Buffer {
    ptr: *mut Sample,
    len: usize,
    own_memory: bool,
}

// Safety: buffers follow the engine's single-writer, multi-reader per cycle
// discipline. The producer finishes writing before any consumer holds a
// reference to the contents, and no two writers target the same buffer in
// the same cycle.
unsafe impl Send for Buffer {}
unsafe impl Sync for Buffer {}

impl Buffer {
    /// Allocate a zero-initialised buffer of `len` samples.
    pub fn owned(len: usize) -> Buffer {
        let storage = vec![0.0 as Sample; len].into_boxed_slice();
        let ptr = Box::into_raw(storage) as *mut Sample;
        Buffer {
            ptr,
            len,
            own_memory: true,
        }
    }

    /// Wrap externally owned memory of `len` samples.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `len` samples for the
    /// whole lifetime of the returned buffer, and the caller must uphold the
    /// single-writer-per-cycle discipline for the wrapped memory. The buffer
    /// never frees the pointee.
    pub unsafe fn borrowed(ptr: *mut Sample, len: usize) -> Buffer {
        assert!(!ptr.is_null());
        Buffer {
            ptr,
            len,
            own_memory: false,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw pointer to the sample storage, e.g. for connecting plugin ports.
    pub fn as_ptr(&self) -> *mut Sample {
        self.ptr
    }

    /// View the samples as a slice.
    pub fn as_slice(&self) -> &[Sample] {
        // Safety: ptr/len describe a live allocation (owned) or a borrow the
        // caller promised outlives self; see `borrowed`.
        unsafe { core::slice::from_raw_parts(self.ptr, self.len) }
    }

    /// Set every sample to 0.
    pub fn zero(&self) {
        // Safety: see `as_slice`; mutation is covered by the single-writer
        // discipline documented on the type.
        pcm::zero(unsafe { core::slice::from_raw_parts_mut(self.ptr, self.len) });
    }

    /// Copy `src` into the front of this buffer. `src` must fit.
    pub fn set(&self, src: &[Sample]) {
        if src.len() > self.len {
            fault!(
                "attempt to set buffer contents with a size that was too large: {} > {}",
                src.len(),
                self.len
            );
        }
        // Safety: as in `zero`; `src` cannot overlap the destination because
        // it is an immutable borrow held across the copy.
        unsafe {
            core::ptr::copy_nonoverlapping(src.as_ptr(), self.ptr, src.len());
        }
    }

    /// Elementwise add `other` into this buffer. Sizes must match.
    pub fn mix(&self, other: &Buffer) {
        if self.len != other.len {
            fault!(
                "attempt to mix buffers of different size: {} != {}",
                self.len, other.len
            );
        }
        // Safety: raw reads/writes avoid constructing overlapping slices if
        // a caller mixes a buffer into itself.
        unsafe {
            for i in 0..self.len {
                let sum = *self.ptr.add(i) + *other.ptr.add(i);
                *self.ptr.add(i) = sum;
            }
        }
    }

    /// Multiply every sample by `factor`.
    pub fn scale(&self, factor: Sample) {
        // Safety: see `zero`.
        pcm::scale(
            unsafe { core::slice::from_raw_parts_mut(self.ptr, self.len) },
            factor,
        );
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if self.own_memory {
            // Safety: `ptr`/`len` came out of `Box::into_raw` in `owned` and
            // ownership has not been released elsewhere.
            unsafe {
                drop(Box::from_raw(core::ptr::slice_from_raw_parts_mut(
                    self.ptr, self.len,
                )));
            }
        }
    }
}

impl core::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.len)
            .field("own_memory", &self.own_memory)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owned_starts_zeroed() {
        let b = Buffer::owned(8);
        assert_eq!(b.len(), 8);
        assert!(b.as_slice().iter().all(|s| *s == 0.0));
    }

    #[test]
    fn set_and_mix() {
        let a = Buffer::owned(4);
        let b = Buffer::owned(4);
        a.set(&[1.0, 2.0, 3.0, 4.0]);
        b.set(&[10.0, 20.0, 30.0, 40.0]);
        a.mix(&b);
        assert_eq!(a.as_slice(), &[11.0, 22.0, 33.0, 44.0]);
    }

    #[test]
    fn set_allows_shorter_source() {
        let a = Buffer::owned(4);
        a.set(&[5.0, 6.0]);
        assert_eq!(a.as_slice(), &[5.0, 6.0, 0.0, 0.0]);
    }

    #[test]
    #[should_panic(expected = "size that was too large")]
    fn set_rejects_longer_source() {
        let a = Buffer::owned(2);
        a.set(&[1.0, 2.0, 3.0]);
    }

    #[test]
    #[should_panic(expected = "different size")]
    fn mix_rejects_size_mismatch() {
        let a = Buffer::owned(2);
        let b = Buffer::owned(3);
        a.mix(&b);
    }

    #[test]
    fn scale_and_zero() {
        let a = Buffer::owned(3);
        a.set(&[1.0, -2.0, 4.0]);
        a.scale(0.5);
        assert_eq!(a.as_slice(), &[0.5, -1.0, 2.0]);
        a.zero();
        assert_eq!(a.as_slice(), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn borrowed_writes_through() {
        let mut external = [0.0f32; 4];
        {
            let b = unsafe { Buffer::borrowed(external.as_mut_ptr(), external.len()) };
            b.set(&[7.0, 8.0, 9.0, 10.0]);
        }
        assert_eq!(external, [7.0, 8.0, 9.0, 10.0]);
    }
}
