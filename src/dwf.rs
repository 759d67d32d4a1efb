use crate::constants::DwfParam;
use libc::{c_char, c_int};
use libloading::{Library, Symbol};
use std::{ffi::CStr, fmt};

/// Raw device handle as handed out by `FDwfDeviceOpen`.
pub type Hdwf = c_int;

#[cfg(target_os = "windows")]
const LIBRARY_PATH: &str = "dwf.dll";
#[cfg(target_os = "macos")]
const LIBRARY_PATH: &str = "/Library/Frameworks/dwf.framework/dwf";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const LIBRARY_PATH: &str = "libdwf.so";

/// Path (or bare name) of the WaveForms runtime on this platform.
pub fn default_library_path() -> &'static str {
    LIBRARY_PATH
}

/// Looks up `$name` in the loaded library, calls it with the typed arguments
/// and turns a FALSE return into a `DwfError::Call`.
macro_rules! dwf_call {
    ($dwf:expr, $name:ident ( $($arg:expr => $ty:ty),* $(,)? )) => {{
        let dwf: &$crate::Dwf = $dwf;
        let func = dwf.symbol::<unsafe extern "C" fn($($ty),*) -> libc::c_int>(stringify!($name))?;
        let ret = unsafe { func($($arg),*) };
        dwf.check(stringify!($name), ret)
    }};
}
pub(crate) use dwf_call;

#[repr(i32)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DwfErc {
    NoErc = 0,
    Unknown = 1,
    ApiLockTimeout = 2,
    AlreadyOpened = 3,
    NotSupported = 4,
    InvalidParameter0 = 0x10,
    InvalidParameter1 = 0x11,
    InvalidParameter2 = 0x12,
    InvalidParameter3 = 0x13,
    InvalidParameter4 = 0x14,
}

impl From<i32> for DwfErc {
    fn from(value: i32) -> Self {
        match value {
            0 => Self::NoErc,
            2 => Self::ApiLockTimeout,
            3 => Self::AlreadyOpened,
            4 => Self::NotSupported,
            0x10 => Self::InvalidParameter0,
            0x11 => Self::InvalidParameter1,
            0x12 => Self::InvalidParameter2,
            0x13 => Self::InvalidParameter3,
            0x14 => Self::InvalidParameter4,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DwfError {
    /// The shared library could not be opened.
    Load { path: String, reason: String },
    /// The library does not export a function we need.
    Symbol { name: &'static str, reason: String },
    /// A call returned FALSE.
    Call {
        function: &'static str,
        code: DwfErc,
        message: String,
    },
    /// `FDwfDeviceOpen` succeeded but handed back `hdwfNone`.
    NoDevice(String),
    /// An I2C transfer was not acknowledged; holds the 1-based byte index.
    Nak(i32),
    /// SCL or SDA held low.
    BusError,
}

impl fmt::Display for DwfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load { path, reason } => write!(f, "failed to load {path}: {reason}"),
            Self::Symbol { name, reason } => write!(f, "missing symbol {name}: {reason}"),
            Self::Call {
                function,
                code,
                message,
            } => write!(f, "{function} failed ({code:?}): {message}"),
            Self::NoDevice(message) => write!(f, "failed to open device: {message}"),
            Self::Nak(index) => write!(f, "I2C NAK at byte {index}"),
            Self::BusError => write!(f, "I2C bus error, check the pull-ups"),
        }
    }
}

impl std::error::Error for DwfError {}

/// Handle on the loaded WaveForms runtime.
pub struct Dwf {
    lib: Library,
    path: String,
}

impl fmt::Debug for Dwf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dwf").field("path", &self.path).finish()
    }
}

impl Dwf {
    pub fn load() -> Result<Self, DwfError> {
        Self::load_from(default_library_path())
    }

    pub fn load_from(path: &str) -> Result<Self, DwfError> {
        let lib = unsafe { Library::new(path) }.map_err(|e| DwfError::Load {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        log::debug!("Loaded {path}");
        Ok(Self {
            lib,
            path: path.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Resolves an exported function. `T` must match the C prototype.
    pub fn symbol<T>(&self, name: &'static str) -> Result<Symbol<'_, T>, DwfError> {
        unsafe { self.lib.get::<T>(name.as_bytes()) }.map_err(|e| DwfError::Symbol {
            name,
            reason: e.to_string(),
        })
    }

    /// Maps a BOOL return onto a result, fetching the last error on failure.
    pub fn check(&self, function: &'static str, ret: c_int) -> Result<(), DwfError> {
        if ret != 0 {
            return Ok(());
        }
        let (code, message) = self.last_error();
        log::error!("{function}: {message}");
        Err(DwfError::Call {
            function,
            code,
            message,
        })
    }

    /// Last error code and message. Never fails; a broken lookup yields `Unknown`.
    pub fn last_error(&self) -> (DwfErc, String) {
        let mut erc: c_int = 0;
        let code = match self.symbol::<unsafe extern "C" fn(*mut c_int) -> c_int>("FDwfGetLastError")
        {
            Ok(func) if unsafe { func(&mut erc) } != 0 => DwfErc::from(erc),
            _ => DwfErc::Unknown,
        };
        let mut buffer = vec![0u8; 512];
        let message =
            match self.symbol::<unsafe extern "C" fn(*mut c_char) -> c_int>("FDwfGetLastErrorMsg") {
                Ok(func) if unsafe { func(buffer.as_mut_ptr() as *mut c_char) } != 0 => {
                    c_buffer_to_string(&buffer)
                }
                _ => String::from("no error message available"),
            };
        (code, message)
    }

    pub fn version(&self) -> Result<String, DwfError> {
        let mut buffer = vec![0u8; 32];
        dwf_call!(self, FDwfGetVersion(buffer.as_mut_ptr() as *mut c_char => *mut c_char))?;
        Ok(c_buffer_to_string(&buffer))
    }

    /// Global parameter applied to devices opened afterwards.
    pub fn param_set(&self, param: DwfParam, value: i32) -> Result<(), DwfError> {
        dwf_call!(self, FDwfParamSet(param as c_int => c_int, value => c_int))
    }

    pub fn param_get(&self, param: DwfParam) -> Result<i32, DwfError> {
        let mut value: c_int = 0;
        dwf_call!(self, FDwfParamGet(param as c_int => c_int, &mut value => *mut c_int))?;
        Ok(value)
    }

    pub fn close_all(&self) -> Result<(), DwfError> {
        dwf_call!(self, FDwfDeviceCloseAll())
    }
}

/// Decodes a NUL-terminated C string buffer, lossy on invalid UTF-8.
pub fn c_buffer_to_string(buffer: &[u8]) -> String {
    match CStr::from_bytes_until_nul(buffer) {
        Ok(s) => s.to_string_lossy().trim_end().to_string(),
        Err(_) => String::from_utf8_lossy(buffer).trim_end().to_string(),
    }
}
