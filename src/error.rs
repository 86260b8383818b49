use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Heap inspection is deliberately forgiving: data-quality problems in the target (unreadable
/// memory, corrupt segment bookkeeping, unknown method tables) are absorbed by the walkers and
/// never surface through this type while a stream is being consumed. What remains are
/// programming errors, malformed boundary structures (PE images, MSF superblocks), and
/// infrastructure failures.
///
/// # Error Categories
///
/// ## Argument and State Errors
/// - [`Error::InvalidArgument`] - A caller-supplied value violates the API contract
/// - [`Error::LockError`] - Thread synchronization failure
///
/// ## Parsing Errors
/// - [`Error::Malformed`] - Corrupted or invalid structure in target data
/// - [`Error::OutOfBounds`] - Attempted to read beyond a buffer boundary
/// - [`Error::NotSupported`] - Unsupported target configuration or format
/// - [`Error::Empty`] - Empty input provided
///
/// ## External Errors
/// - [`Error::GoblinErr`] - PE parsing errors from the goblin crate
///
/// # Examples
///
/// ```rust
/// use heapscope::{Error, MsfHeader};
///
/// match MsfHeader::parse(&[0u8; 16]) {
///     Ok(header) => println!("page size: {}", header.page_size),
///     Err(Error::OutOfBounds) => eprintln!("superblock truncated"),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("malformed superblock: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A caller-supplied argument violates the API contract.
    ///
    /// This is a programming error on the caller's side, such as handing the heap a type
    /// descriptor with a zero method table. It is fatal to the call, never to the process.
    #[error("Invalid argument - {0}")]
    InvalidArgument(&'static str),

    /// A boundary structure is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected for
    /// debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while reading a buffer.
    ///
    /// This is a safety check to prevent overruns when decoding malformed or truncated data.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// The target configuration is not supported.
    ///
    /// Raised when the data reader reports a pointer width other than 4 or 8 bytes, or when
    /// an input uses a format feature this library does not implement.
    #[error("This target configuration is not supported")]
    NotSupported,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// Generic error for miscellaneous failures.
    ///
    /// Used for errors that don't fit into other categories or for wrapping external
    /// failures with additional context.
    #[error("{0}")]
    Error(String),

    /// Error from the goblin crate during PE parsing.
    ///
    /// The goblin crate is used for low-level PE format parsing of module images read out
    /// of the target address space.
    #[error("{0}")]
    GoblinErr(#[from] goblin::error::Error),

    /// Failed to lock target.
    ///
    /// This error occurs when thread synchronization fails, typically when a lock guarding
    /// the heap snapshot is in an invalid (poisoned) state.
    #[error("Failed to lock target")]
    LockError,
}
