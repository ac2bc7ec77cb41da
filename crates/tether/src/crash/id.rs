//! Crash identifiers of the form `<module>+<hex offset>`.

use std::ffi::{CStr, c_void};
use std::fmt::{self, Write as _};

use super::text::StackText;

/// Identifier used when the faulting address is not inside a known module.
pub const UNKNOWN_CRASH_ID: &str = "unknown";

const CRASH_ID_CAPACITY: usize = 256;

/// A loaded module containing some address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedModule<'a> {
    /// Path (or bare name) of the module file.
    pub path: &'a [u8],
    /// Load address of the module.
    pub base: usize,
}

/// Maps code addresses to the module they belong to.
///
/// Implementations are called from the crash handler and must not allocate.
pub trait ModuleResolver: Send + Sync {
    /// Returns the module containing `address`, if any.
    fn resolve(&self, address: usize) -> Option<ResolvedModule<'_>>;
}

/// Resolver backed by `dladdr`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemModuleResolver;

impl ModuleResolver for SystemModuleResolver {
    fn resolve(&self, address: usize) -> Option<ResolvedModule<'_>> {
        if address == 0 {
            return None;
        }
        // SAFETY: `Dl_info` is plain data; zeroed is a valid initial state.
        let mut info: libc::Dl_info = unsafe { std::mem::zeroed() };
        // SAFETY: `dladdr` only inspects the address; `info` is writable.
        let found = unsafe { libc::dladdr(address as *const c_void, &raw mut info) };
        if found == 0 || info.dli_fname.is_null() {
            return None;
        }
        // SAFETY: the dynamic loader keeps `dli_fname` alive while the module
        // stays mapped, which outlasts the crash handler.
        let path = unsafe { CStr::from_ptr(info.dli_fname) }.to_bytes();
        Some(ResolvedModule {
            path,
            base: info.dli_fbase as usize,
        })
    }
}

/// Compact crash identifier built without heap allocation.
#[derive(Clone, Copy)]
pub struct CrashId {
    text: StackText<CRASH_ID_CAPACITY>,
}

impl CrashId {
    /// Resolves `address` and formats `<module base name>+<hex offset>`.
    ///
    /// Falls back to [`UNKNOWN_CRASH_ID`] when the address cannot be resolved
    /// or the module name is not UTF-8.
    pub fn for_address<R: ModuleResolver + ?Sized>(resolver: &R, address: usize) -> Self {
        resolver
            .resolve(address)
            .and_then(|module| Self::from_module(module, address))
            .unwrap_or_else(Self::unknown)
    }

    fn from_module(module: ResolvedModule<'_>, address: usize) -> Option<Self> {
        let name = std::str::from_utf8(base_name(module.path)).ok()?;
        if name.is_empty() {
            return None;
        }
        let offset = address.checked_sub(module.base)?;
        let mut text = StackText::new();
        write!(text, "{name}+{offset:x}").ok()?;
        Some(Self { text })
    }

    /// The fallback identifier.
    #[must_use]
    pub fn unknown() -> Self {
        let mut text = StackText::new();
        // Always fits.
        drop(text.write_str(UNKNOWN_CRASH_ID));
        Self { text }
    }

    /// The identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.text.as_str()
    }
}

impl fmt::Display for CrashId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for CrashId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CrashId").field(&self.as_str()).finish()
    }
}

fn base_name(path: &[u8]) -> &[u8] {
    path.rsplit(|byte| *byte == b'/' || *byte == b'\\')
        .next()
        .unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    struct FixedResolver {
        path: &'static [u8],
        base: usize,
    }

    impl ModuleResolver for FixedResolver {
        fn resolve(&self, address: usize) -> Option<ResolvedModule<'_>> {
            (address >= self.base).then_some(ResolvedModule {
                path: self.path,
                base: self.base,
            })
        }
    }

    struct NoModules;

    impl ModuleResolver for NoModules {
        fn resolve(&self, _address: usize) -> Option<ResolvedModule<'_>> {
            None
        }
    }

    #[rstest]
    #[case(b"foo.dll", 0x1234, "foo.dll+1234")]
    #[case(b"/opt/tether/1.0/libtether_main.so", 0xdead_beef, "libtether_main.so+deadbeef")]
    #[case(b"C:\\App\\foo.dll", 0, "foo.dll+0")]
    fn formats_module_and_offset(
        #[case] path: &'static [u8],
        #[case] offset: usize,
        #[case] expected: &str,
    ) {
        let resolver = FixedResolver {
            path,
            base: 0x7f00_0000,
        };
        let id = CrashId::for_address(&resolver, 0x7f00_0000 + offset);
        assert_eq!(id.as_str(), expected);
    }

    #[test]
    fn unresolved_address_uses_fallback() {
        assert_eq!(CrashId::for_address(&NoModules, 0x4000).as_str(), UNKNOWN_CRASH_ID);
    }

    #[test]
    fn non_utf8_module_name_uses_fallback() {
        let resolver = FixedResolver {
            path: b"/lib/\xff\xfe.so",
            base: 0x1000,
        };
        assert_eq!(CrashId::for_address(&resolver, 0x1010).as_str(), UNKNOWN_CRASH_ID);
    }

    #[test]
    fn system_resolver_finds_own_code() {
        let address = system_resolver_finds_own_code as fn() as usize;
        let id = CrashId::for_address(&SystemModuleResolver, address);
        assert_ne!(id.as_str(), UNKNOWN_CRASH_ID);
        assert!(id.as_str().contains('+'));
    }
}
