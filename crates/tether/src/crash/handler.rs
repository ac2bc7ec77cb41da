//! Process-wide signal handler feeding the installed [`CrashReporter`].

use std::ffi::{c_int, c_void};
use std::io;
use std::ptr;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};

use super::errors::CrashError;
use super::report::CrashReporter;

const CRASH_SIGNALS: [Signal; 6] = [
    Signal::SIGSEGV,
    Signal::SIGBUS,
    Signal::SIGILL,
    Signal::SIGFPE,
    Signal::SIGABRT,
    Signal::SIGTRAP,
];

const ALT_STACK_SIZE: usize = 64 * 1024;

static REPORTER: OnceLock<CrashReporter> = OnceLock::new();
static HANDLING: AtomicBool = AtomicBool::new(false);

/// Freezes `reporter` for the rest of the process and routes crash signals
/// to it.
///
/// The alternate stack covers the installing thread only; a stack overflow on
/// another thread is not captured.
pub(super) fn install(reporter: CrashReporter) -> Result<&'static CrashReporter, CrashError> {
    REPORTER
        .set(reporter)
        .map_err(|_rejected| CrashError::AlreadyInstalled)?;
    install_alt_stack()?;
    let action = SigAction::new(
        SigHandler::SigAction(handle_signal),
        SaFlags::SA_SIGINFO | SaFlags::SA_ONSTACK,
        SigSet::empty(),
    );
    for signal in CRASH_SIGNALS {
        // SAFETY: the handler only reads state frozen in `REPORTER`.
        unsafe { sigaction(signal, &action) }.map_err(|source| CrashError::Signal {
            signal: signal as i32,
            source,
        })?;
    }
    REPORTER.get().ok_or(CrashError::AlreadyInstalled)
}

fn install_alt_stack() -> Result<(), CrashError> {
    let stack: &'static mut [u8] = Box::leak(vec![0_u8; ALT_STACK_SIZE].into_boxed_slice());
    let alt = libc::stack_t {
        ss_sp: stack.as_mut_ptr().cast(),
        ss_flags: 0,
        ss_size: stack.len(),
    };
    // SAFETY: the stack is leaked and outlives every handler invocation.
    if unsafe { libc::sigaltstack(&raw const alt, ptr::null_mut()) } != 0 {
        return Err(CrashError::AltStack {
            source: io::Error::last_os_error(),
        });
    }
    Ok(())
}

extern "C" fn handle_signal(signal: c_int, info: *mut libc::siginfo_t, context: *mut c_void) {
    if !HANDLING.swap(true, Ordering::SeqCst)
        && let Some(reporter) = REPORTER.get()
    {
        reporter.on_crash(signal, fault_address(info, context));
    }
    // SAFETY: restoring the default disposition and re-raising is
    // async-signal-safe. The signal stays blocked until the handler returns,
    // so the process terminates with the original signal right after.
    unsafe {
        libc::signal(signal, libc::SIG_DFL);
        libc::raise(signal);
    }
}

fn fault_address(info: *mut libc::siginfo_t, context: *mut c_void) -> usize {
    instruction_pointer(context)
        .or_else(|| signal_address(info))
        .unwrap_or(0)
}

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
fn instruction_pointer(context: *mut c_void) -> Option<usize> {
    let context = context.cast::<libc::ucontext_t>();
    if context.is_null() {
        return None;
    }
    // SAFETY: the kernel passes a valid `ucontext_t` to SA_SIGINFO handlers.
    let registers = unsafe { &(*context).uc_mcontext.gregs };
    let index = usize::try_from(libc::REG_RIP).ok()?;
    registers
        .get(index)
        .and_then(|rip| usize::try_from(*rip).ok())
}

#[cfg(all(target_os = "linux", target_arch = "aarch64"))]
fn instruction_pointer(context: *mut c_void) -> Option<usize> {
    let context = context.cast::<libc::ucontext_t>();
    if context.is_null() {
        return None;
    }
    // SAFETY: the kernel passes a valid `ucontext_t` to SA_SIGINFO handlers.
    usize::try_from(unsafe { (*context).uc_mcontext.pc }).ok()
}

#[cfg(not(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64"))))]
const fn instruction_pointer(_context: *mut c_void) -> Option<usize> {
    None
}

#[cfg(target_os = "linux")]
fn signal_address(info: *mut libc::siginfo_t) -> Option<usize> {
    if info.is_null() {
        return None;
    }
    // SAFETY: valid for the fault signals this handler is registered for.
    let address = unsafe { (*info).si_addr() };
    Some(address as usize).filter(|address| *address != 0)
}

#[cfg(not(target_os = "linux"))]
fn signal_address(info: *mut libc::siginfo_t) -> Option<usize> {
    if info.is_null() {
        return None;
    }
    // SAFETY: valid for the fault signals this handler is registered for.
    let address = unsafe { (*info).si_addr };
    Some(address as usize).filter(|address| *address != 0)
}
