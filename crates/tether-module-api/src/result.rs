use std::ffi::c_int;

/// Returned by the loader when a module cannot be opened or lacks its entry
/// symbol.
pub const LOAD_FAILURE: c_int = -1;

/// Process result codes returned by integer entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ResultCode {
    /// The module finished normally.
    NormalExit = 0,
    /// The module asks the launcher to start the application again.
    RestartApp = 1,
    /// Reserved for a cancelled sign-in flow.
    LoginCancelled = 2,
    /// An unrecoverable error ended the module.
    ErrorOccurred = 3,
    /// Required data files are missing.
    MissingData = 4,
}

impl ResultCode {
    /// Raw integer value.
    #[must_use]
    pub const fn code(self) -> c_int {
        self as c_int
    }

    /// Maps a raw entry-point return value.
    ///
    /// [`LOAD_FAILURE`] maps to [`ResultCode::ErrorOccurred`]; unknown values
    /// yield `None`.
    #[must_use]
    pub const fn from_code(code: c_int) -> Option<Self> {
        match code {
            0 => Some(Self::NormalExit),
            1 => Some(Self::RestartApp),
            2 => Some(Self::LoginCancelled),
            3 | LOAD_FAILURE => Some(Self::ErrorOccurred),
            4 => Some(Self::MissingData),
            _ => None,
        }
    }
}

impl From<ResultCode> for c_int {
    fn from(value: ResultCode) -> Self {
        value.code()
    }
}
