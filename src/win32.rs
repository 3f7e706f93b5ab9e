#![allow(non_snake_case)]

//! Thin safe wrappers over the Win32 calls used by the spawn, supervision,
//! and pipe machinery.

use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io::{Error, Result};
use std::iter;
use std::mem;
use std::os::windows::ffi::{OsStrExt, OsStringExt};
use std::os::windows::io::{AsRawHandle, FromRawHandle, RawHandle};
use std::ptr;
use std::time::Duration;

use winapi::shared::minwindef::{BOOL, DWORD, FALSE, LPVOID};
use winapi::um::handleapi::{self, INVALID_HANDLE_VALUE};
use winapi::um::minwinbase::SECURITY_ATTRIBUTES;
use winapi::um::namedpipeapi::CreatePipe;
use winapi::um::processenv;
use winapi::um::processthreadsapi::{self, CreateProcessW, PROCESS_INFORMATION, STARTUPINFOW};
use winapi::um::synchapi;
use winapi::um::winbase::{
    CREATE_UNICODE_ENVIRONMENT, INFINITE, STARTF_USESTDHANDLES, STD_ERROR_HANDLE,
    STD_INPUT_HANDLE, STD_OUTPUT_HANDLE, WAIT_FAILED, WAIT_OBJECT_0,
};
use winapi::um::winbase::WAIT_ABANDONED;
use winapi::shared::winerror::WAIT_TIMEOUT;

pub use winapi::shared::winerror::ERROR_ACCESS_DENIED;
pub use winapi::shared::winerror::ERROR_BAD_PATHNAME;
pub use winapi::um::winbase::CREATE_NEW_PROCESS_GROUP;

pub const STILL_ACTIVE: u32 = 259;
pub const HANDLE_FLAG_INHERIT: u32 = 1;

/// An owned process or file handle, closed on drop.
#[derive(Debug)]
pub struct Handle(RawHandle);

unsafe impl Send for Handle {}
unsafe impl Sync for Handle {}

impl Drop for Handle {
    fn drop(&mut self) {
        unsafe {
            handleapi::CloseHandle(self.0);
        }
    }
}

impl AsRawHandle for Handle {
    fn as_raw_handle(&self) -> RawHandle {
        self.0
    }
}

fn check(status: BOOL) -> Result<()> {
    if status != 0 {
        Ok(())
    } else {
        Err(Error::last_os_error())
    }
}

fn check_handle(raw_handle: RawHandle) -> Result<RawHandle> {
    if raw_handle != INVALID_HANDLE_VALUE {
        Ok(raw_handle)
    } else {
        Err(Error::last_os_error())
    }
}

// OsStr to zero-terminated owned vector
fn to_nullterm(s: &OsStr) -> Vec<u16> {
    s.encode_wide().chain(iter::once(0u16)).collect()
}

/// Create an anonymous pipe. Both handles come out non-inheritable, so a
/// concurrent spawn cannot pick them up by accident; the spawn machinery
/// flips a child's copy to inheritable under the spawn lock only.
pub fn make_pipe() -> Result<(File, File)> {
    let mut sa = SECURITY_ATTRIBUTES {
        nLength: mem::size_of::<SECURITY_ATTRIBUTES>() as DWORD,
        lpSecurityDescriptor: ptr::null_mut(),
        bInheritHandle: FALSE,
    };
    let mut read_handle: RawHandle = ptr::null_mut();
    let mut write_handle: RawHandle = ptr::null_mut();
    check(unsafe {
        CreatePipe(
            &mut read_handle as *mut _ as *mut _,
            &mut write_handle as *mut _ as *mut _,
            &mut sa,
            0,
        )
    })?;
    Ok(unsafe {
        (
            File::from_raw_handle(read_handle),
            File::from_raw_handle(write_handle),
        )
    })
}

pub fn SetHandleInformation(file: &File, mask: u32, flags: u32) -> Result<()> {
    check(unsafe { handleapi::SetHandleInformation(file.as_raw_handle(), mask, flags) })
}

pub fn get_std_handle(which: DWORD) -> Result<RawHandle> {
    debug_assert!(matches!(
        which,
        STD_INPUT_HANDLE | STD_OUTPUT_HANDLE | STD_ERROR_HANDLE
    ));
    check_handle(unsafe { processenv::GetStdHandle(which) })
}

#[allow(clippy::too_many_arguments)]
pub fn CreateProcess(
    cmdline: &OsStr,
    env_block: Option<&[u16]>,
    cwd: Option<&OsStr>,
    creation_flags: u32,
    stdin: Option<RawHandle>,
    stdout: Option<RawHandle>,
    stderr: Option<RawHandle>,
) -> Result<(Handle, u32)> {
    let mut sinfo: STARTUPINFOW = unsafe { mem::zeroed() };
    sinfo.cb = mem::size_of::<STARTUPINFOW>() as DWORD;
    sinfo.dwFlags = STARTF_USESTDHANDLES;
    sinfo.hStdInput = stdin.unwrap_or(ptr::null_mut());
    sinfo.hStdOutput = stdout.unwrap_or(ptr::null_mut());
    sinfo.hStdError = stderr.unwrap_or(ptr::null_mut());
    let mut pinfo: PROCESS_INFORMATION = unsafe { mem::zeroed() };
    let mut cmdline = to_nullterm(cmdline);
    let env_block_ptr = env_block.map(|v| v.as_ptr()).unwrap_or(ptr::null()) as LPVOID;
    let cwd = cwd.map(to_nullterm);
    check(unsafe {
        CreateProcessW(
            ptr::null(),
            cmdline.as_mut_ptr(),
            ptr::null_mut(),
            ptr::null_mut(),
            1, // bInheritHandles
            creation_flags | CREATE_UNICODE_ENVIRONMENT,
            env_block_ptr,
            cwd.as_ref().map(|v| v.as_ptr()).unwrap_or(ptr::null()),
            &mut sinfo,
            &mut pinfo,
        )
    })?;
    unsafe {
        drop(Handle(pinfo.hThread));
        Ok((Handle(pinfo.hProcess), pinfo.dwProcessId as u32))
    }
}

#[allow(clippy::upper_case_acronyms)]
pub enum WaitEvent {
    OBJECT_0,
    ABANDONED,
    TIMEOUT,
}

pub fn WaitForSingleObject(handle: &Handle, timeout: Option<Duration>) -> Result<WaitEvent> {
    let timeout_ms = timeout
        .map(|t| t.as_millis().min((INFINITE - 1) as u128) as u32)
        .unwrap_or(INFINITE);
    let result = unsafe { synchapi::WaitForSingleObject(handle.as_raw_handle(), timeout_ms) };
    if result == WAIT_OBJECT_0 {
        Ok(WaitEvent::OBJECT_0)
    } else if result == WAIT_ABANDONED {
        Ok(WaitEvent::ABANDONED)
    } else if result == WAIT_TIMEOUT {
        Ok(WaitEvent::TIMEOUT)
    } else if result == WAIT_FAILED {
        Err(Error::last_os_error())
    } else {
        panic!("WaitForSingleObject returned {}", result);
    }
}

pub fn GetExitCodeProcess(handle: &Handle) -> Result<u32> {
    let mut exit_code = 0u32;
    check(unsafe {
        processthreadsapi::GetExitCodeProcess(handle.as_raw_handle(), &mut exit_code as *mut u32)
    })?;
    Ok(exit_code)
}

pub fn TerminateProcess(handle: &Handle, exit_code: u32) -> Result<()> {
    check(unsafe { processthreadsapi::TerminateProcess(handle.as_raw_handle(), exit_code) })
}

/// Quote argv into a single command line, undoing the inverse parse that
/// `CommandLineToArgvW` performs in the child.
pub fn assemble_cmdline(argv: &[OsString]) -> Result<OsString> {
    let mut cmdline = vec![];
    for (i, arg) in argv.iter().enumerate() {
        if i > 0 {
            cmdline.push(' ' as u16);
        }
        if arg.encode_wide().any(|c| c == 0) {
            return Err(Error::from_raw_os_error(ERROR_BAD_PATHNAME as _));
        }
        append_quoted(arg, &mut cmdline);
    }
    Ok(OsString::from_wide(&cmdline))
}

// Translated from ArgvQuote at
// https://learn.microsoft.com/en-us/archive/blogs/twistylittlepassagesallalike/everyone-quotes-command-line-arguments-the-wrong-way
fn append_quoted(arg: &OsStr, cmdline: &mut Vec<u16>) {
    if !arg.is_empty()
        && !arg.encode_wide().any(|c| {
            c == ' ' as u16
                || c == '\t' as u16
                || c == '\n' as u16
                || c == '\x0b' as u16
                || c == '\"' as u16
        })
    {
        cmdline.extend(arg.encode_wide());
        return;
    }
    cmdline.push('"' as u16);

    let arg: Vec<_> = arg.encode_wide().collect();
    let mut i = 0;
    while i < arg.len() {
        let mut num_backslashes = 0;
        while i < arg.len() && arg[i] == '\\' as u16 {
            i += 1;
            num_backslashes += 1;
        }

        if i == arg.len() {
            for _ in 0..num_backslashes * 2 {
                cmdline.push('\\' as u16);
            }
            break;
        } else if arg[i] == b'"' as u16 {
            for _ in 0..num_backslashes * 2 + 1 {
                cmdline.push('\\' as u16);
            }
            cmdline.push(arg[i]);
        } else {
            for _ in 0..num_backslashes {
                cmdline.push('\\' as u16);
            }
            cmdline.push(arg[i]);
        }
        i += 1;
    }
    cmdline.push('"' as u16);
}
