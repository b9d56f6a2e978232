use core::fmt;

use thiserror::Error;

/// Raw driver status code (`esp_err_t`).
///
/// Values are forwarded from the driver untouched; this type only gives them a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Status(pub i32);

impl Status {
    pub const OK: Status = Status(0);
    pub const FAIL: Status = Status(-1);
    pub const NO_MEM: Status = Status(0x101);
    pub const INVALID_ARG: Status = Status(0x102);
    pub const INVALID_STATE: Status = Status(0x103);
    pub const INVALID_SIZE: Status = Status(0x104);
    pub const NOT_FOUND: Status = Status(0x105);
    pub const NOT_SUPPORTED: Status = Status(0x106);
    pub const TIMEOUT: Status = Status(0x107);

    pub const fn code(self) -> i32 {
        self.0
    }

    pub const fn is_ok(self) -> bool {
        self.0 == Self::OK.0
    }

    pub fn name(self) -> &'static str {
        err_to_name(self.0)
    }

    /// Turns a non-zero status into an error, for callers that want `?`.
    pub fn check(self) -> Result<(), StatusError> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(StatusError(self))
        }
    }
}

impl From<i32> for Status {
    fn from(code: i32) -> Self {
        Status(code)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#x})", self.name(), self.0)
    }
}

/// A status other than `ESP_OK`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("driver returned {0}")]
pub struct StatusError(pub Status);

impl StatusError {
    pub const fn status(&self) -> Status {
        self.0
    }
}

/// Name of a status code, as `esp_err_to_name` reports it.
#[cfg(target_os = "espidf")]
pub fn err_to_name(code: i32) -> &'static str {
    use core::ffi::CStr;

    // esp_err_to_name always returns a pointer into a static table.
    let name = unsafe { CStr::from_ptr(esp_idf_sys::esp_err_to_name(code)) };
    name.to_str().unwrap_or(UNKNOWN_ERROR)
}

/// Name of a status code, as `esp_err_to_name` reports it.
#[cfg(not(target_os = "espidf"))]
pub fn err_to_name(code: i32) -> &'static str {
    match code {
        0 => "ESP_OK",
        -1 => "ESP_FAIL",
        0x101 => "ESP_ERR_NO_MEM",
        0x102 => "ESP_ERR_INVALID_ARG",
        0x103 => "ESP_ERR_INVALID_STATE",
        0x104 => "ESP_ERR_INVALID_SIZE",
        0x105 => "ESP_ERR_NOT_FOUND",
        0x106 => "ESP_ERR_NOT_SUPPORTED",
        0x107 => "ESP_ERR_TIMEOUT",
        0x108 => "ESP_ERR_INVALID_RESPONSE",
        0x109 => "ESP_ERR_INVALID_CRC",
        0x10A => "ESP_ERR_INVALID_VERSION",
        0x10B => "ESP_ERR_INVALID_MAC",
        0x10C => "ESP_ERR_NOT_FINISHED",
        0x10D => "ESP_ERR_NOT_ALLOWED",
        _ => UNKNOWN_ERROR,
    }
}

const UNKNOWN_ERROR: &str = "UNKNOWN ERROR";
