//! Crash dump files.

use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

use bitflags::bitflags;

use super::text::StackText;

bitflags! {
    /// Content captured in a crash dump.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DumpFlags: u32 {
        /// Process and thread status.
        const PROCESS_THREAD_DATA = 1;
        /// Per-thread scheduling state.
        const THREAD_INFO = 1 << 1;
        /// Module map, including modules unloaded since the crash.
        const UNLOADED_MODULES = 1 << 2;
        /// Memory referenced from thread stacks.
        const INDIRECTLY_REFERENCED_MEMORY = 1 << 3;
        /// Detailed memory map of the whole process.
        const FULL_MEMORY = 1 << 4;
    }
}

impl DumpFlags {
    /// Flags always captured.
    pub const BASELINE: Self = Self::PROCESS_THREAD_DATA
        .union(Self::THREAD_INFO)
        .union(Self::UNLOADED_MODULES)
        .union(Self::INDIRECTLY_REFERENCED_MEMORY);

    /// Baseline flags plus full memory when requested.
    #[must_use]
    pub const fn for_request(full_memory: bool) -> Self {
        if full_memory {
            Self::BASELINE.union(Self::FULL_MEMORY)
        } else {
            Self::BASELINE
        }
    }
}

/// What the handler knows about the fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fault {
    /// Crashing process.
    pub pid: u32,
    /// Signal number.
    pub signal: i32,
    /// Faulting instruction address, or zero when unknown.
    pub address: usize,
}

const SECTIONS: &[(DumpFlags, &str, &str)] = &[
    (DumpFlags::PROCESS_THREAD_DATA, "status", "/proc/self/status"),
    (DumpFlags::THREAD_INFO, "stat", "/proc/self/stat"),
    (DumpFlags::UNLOADED_MODULES, "maps", "/proc/self/maps"),
    (DumpFlags::FULL_MEMORY, "smaps", "/proc/self/smaps"),
];

/// Writes a dump for `fault` to `path`, which must not exist yet.
pub(crate) fn write_dump(path: &Path, fault: &Fault, flags: DumpFlags) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    let mut header = StackText::<512>::new();
    // Truncation only shortens the header.
    drop(write!(
        header,
        "tether crash dump\npid: {}\nsignal: {}\naddress: {:#x}\nflags: ",
        fault.pid, fault.signal, fault.address
    ));
    drop(bitflags::parser::to_writer(&flags, &mut header));
    drop(header.write_char('\n'));
    file.write_all(header.as_bytes())?;
    for (flag, name, source) in SECTIONS {
        if flags.contains(*flag) {
            write_section(&mut file, name, Path::new(source))?;
        }
    }
    file.sync_all()
}

fn write_section(file: &mut File, name: &str, source: &Path) -> io::Result<()> {
    file.write_all(b"\n== ")?;
    file.write_all(name.as_bytes())?;
    file.write_all(b" ==\n")?;
    let Ok(mut input) = File::open(source) else {
        return file.write_all(b"(unavailable)\n");
    };
    let mut chunk = [0_u8; 4096];
    loop {
        let read = input.read(&mut chunk)?;
        match chunk.get(..read) {
            Some(bytes) if !bytes.is_empty() => file.write_all(bytes)?,
            _ => return Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn full_memory_is_opt_in() {
        assert!(!DumpFlags::for_request(false).contains(DumpFlags::FULL_MEMORY));
        assert!(DumpFlags::for_request(true).contains(DumpFlags::FULL_MEMORY));
        assert!(DumpFlags::for_request(false).contains(DumpFlags::BASELINE));
    }

    #[test]
    fn dump_starts_with_header() {
        let temp = tempfile::tempdir().expect("temp dir");
        let path = temp.path().join("crash.dmp");
        let fault = Fault {
            pid: 42,
            signal: libc::SIGSEGV,
            address: 0x1234,
        };
        write_dump(&path, &fault, DumpFlags::BASELINE).expect("dump written");
        let text = fs::read_to_string(&path).expect("dump readable");
        assert!(text.starts_with("tether crash dump\npid: 42\n"));
        assert!(text.contains("address: 0x1234"));
        assert!(text.contains("UNLOADED_MODULES"));
        assert!(text.contains("== maps =="));
        assert!(!text.contains("== smaps =="));
    }

    #[test]
    fn existing_dump_is_not_overwritten() {
        let temp = tempfile::tempdir().expect("temp dir");
        let path = temp.path().join("crash.dmp");
        fs::write(&path, b"earlier").expect("seed");
        let fault = Fault {
            pid: 1,
            signal: libc::SIGABRT,
            address: 0,
        };
        assert!(write_dump(&path, &fault, DumpFlags::BASELINE).is_err());
    }
}
