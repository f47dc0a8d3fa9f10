use std::ffi::{c_char, CString};
use std::pin::Pin;
use std::ptr;

/// A container which owns a list of C strings and exposes them in the
/// null-terminated-array-of-pointers shape that execvp consumes.
pub struct OwningNullTerminatedArray {
    // Note that `pointers` holds pointers into the boxed strings' heap
    // buffers, which stay put for the lifetime of the container.
    _strings: Pin<Box<[CString]>>,
    pointers: Box<[*const c_char]>,
}

impl OwningNullTerminatedArray {
    /// Construct, taking ownership of a list of strings.
    pub fn new(strs: Vec<CString>) -> Self {
        let strings = Pin::from(strs.into_boxed_slice());
        let mut pointers = Vec::with_capacity(strings.len() + 1);
        for s in strings.iter() {
            pointers.push(s.as_ptr());
        }
        pointers.push(ptr::null());
        OwningNullTerminatedArray {
            _strings: strings,
            pointers: pointers.into_boxed_slice(),
        }
    }

    /// Return the pointer array, appropriate for argv.
    pub fn get(&self) -> *const *const c_char {
        assert!(
            self.pointers.last().unwrap().is_null(),
            "Should have null terminator"
        );
        self.pointers.as_ptr()
    }

    /// Return the first string's pointer, i.e. the program name.
    /// The array must not be empty.
    pub fn head(&self) -> *const c_char {
        assert!(self.pointers.len() > 1, "No program name");
        self.pointers[0]
    }
}

/// Safety: the pointer array is immutable and targets owned heap buffers.
unsafe impl Send for OwningNullTerminatedArray {}
unsafe impl Sync for OwningNullTerminatedArray {}

#[cfg(test)]
mod tests {
    use super::OwningNullTerminatedArray;
    use std::ffi::{CStr, CString};
    use std::ptr;

    #[test]
    fn test_owning_null_terminated_array() {
        let owned_strs = vec![CString::new("foo").unwrap(), CString::new("bar").unwrap()];
        let arr = OwningNullTerminatedArray::new(owned_strs);
        let ptr = arr.get();
        unsafe {
            assert_eq!(CStr::from_ptr(*ptr).to_str().unwrap(), "foo");
            assert_eq!(CStr::from_ptr(*ptr.offset(1)).to_str().unwrap(), "bar");
            assert_eq!(*ptr.offset(2), ptr::null());
        }
        assert_eq!(arr.head(), unsafe { *arr.get() });
    }
}
