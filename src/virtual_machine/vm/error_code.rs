//! Guest-visible error codes written to `er` by failing syscalls.

use std::fmt;
use std::io;

macro_rules! error_codes {
    ( $( $name:ident = $value:literal => $message:literal ),* $(,)? ) => {
        /// POSIX-like error code reported through the `er` register.
        #[repr(u64)]
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum ErrorCode {
            $( $name = $value, )*
            /// Host error with no closer match.
            Unknown = u64::MAX,
        }

        impl ErrorCode {
            /// Every defined code except [`ErrorCode::Unknown`], in numeric order.
            pub const ALL: &'static [ErrorCode] = &[ $( ErrorCode::$name, )* ];

            /// Lowercase human-readable message.
            pub const fn message(&self) -> &'static str {
                match self {
                    $( ErrorCode::$name => $message, )*
                    ErrorCode::Unknown => "unknown error",
                }
            }

            /// Maps a raw `er` value back to its code.
            pub fn from_u64(value: u64) -> Option<Self> {
                match value {
                    $( $value => Some(ErrorCode::$name), )*
                    u64::MAX => Some(ErrorCode::Unknown),
                    _ => None,
                }
            }
        }
    };
}

error_codes! {
    UnknownSyscall = 1 => "unknown syscall",
    Eperm = 2 => "operation not permitted",
    Enoent = 3 => "no such file or directory",
    Esrch = 4 => "no such process",
    Ebadf = 5 => "bad file descriptor",
    Echild = 6 => "no child processes",
    Eagain = 7 => "resource temporarily unavailable",
    Ewouldblock = 8 => "resource temporarily unavailable",
    Eacces = 9 => "permission denied",
    Efault = 10 => "bad address",
    Eexist = 11 => "file exists",
    Enodev = 12 => "no such device",
    Enotdir = 13 => "not a directory",
    Eisdir = 14 => "is a directory",
    Einval = 15 => "invalid argument",
    Espipe = 16 => "illegal seek",
    Emlink = 17 => "too many links",
    Epipe = 18 => "broken pipe",
    Edeadlk = 19 => "resource deadlock avoided",
    Edeadlock = 20 => "resource deadlock avoided",
    Enametoolong = 21 => "file name too long",
    Enosys = 22 => "function not implemented",
    Enotempty = 23 => "directory not empty",
    Eloop = 24 => "too many levels of symbolic links",
    Ebadmsg = 25 => "bad message",
    Eoverflow = 26 => "value too large for defined data type",
    Enotuniq = 27 => "name not unique on network",
    Ebadfd = 28 => "file descriptor in bad state",
    Eremchg = 29 => "remote address changed",
    Enotsock = 30 => "socket operation on non-socket",
    Edestaddrreq = 31 => "destination address required",
    Emsgsize = 32 => "message too long",
    Esocktnosupport = 33 => "socket type not supported",
    Epfnosupport = 34 => "protocol family not supported",
    Eafnosupport = 35 => "address family not supported by protocol",
    Eaddrinuse = 36 => "address already in use",
    Eaddrnotavail = 37 => "cannot assign requested address",
    Enetdown = 38 => "network is down",
    Enetunreach = 39 => "network is unreachable",
    Enetreset = 40 => "network dropped connection on reset",
    Econnaborted = 41 => "software caused connection abort",
    Econnreset = 42 => "connection reset by peer",
    Etimedout = 43 => "connection timed out",
    Econnrefused = 44 => "connection refused",
    Ehostdown = 45 => "host is down",
    Ehostunreach = 46 => "no route to host",
    Efailedcreate = 47 => "failed to create",
    Eaddroutofbounds = 48 => "address out of bounds",
    Einvalidlength = 49 => "invalid length",
    Ebadhostaddress = 50 => "bad host address",
    Enothread = 51 => "no such thread",
    Ethreadstarted = 52 => "thread already started",
    Ethreadnotstarted = 53 => "thread not started",
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl ErrorCode {
    /// Maps a Linux errno value.
    pub fn from_errno(errno: i32) -> Self {
        match errno {
            1 => ErrorCode::Eperm,
            2 => ErrorCode::Enoent,
            3 => ErrorCode::Esrch,
            9 => ErrorCode::Ebadf,
            10 => ErrorCode::Echild,
            11 => ErrorCode::Eagain,
            13 => ErrorCode::Eacces,
            14 => ErrorCode::Efault,
            17 => ErrorCode::Eexist,
            19 => ErrorCode::Enodev,
            20 => ErrorCode::Enotdir,
            21 => ErrorCode::Eisdir,
            22 => ErrorCode::Einval,
            29 => ErrorCode::Espipe,
            31 => ErrorCode::Emlink,
            32 => ErrorCode::Epipe,
            35 => ErrorCode::Edeadlk,
            36 => ErrorCode::Enametoolong,
            38 => ErrorCode::Enosys,
            39 => ErrorCode::Enotempty,
            40 => ErrorCode::Eloop,
            74 => ErrorCode::Ebadmsg,
            75 => ErrorCode::Eoverflow,
            76 => ErrorCode::Enotuniq,
            77 => ErrorCode::Ebadfd,
            78 => ErrorCode::Eremchg,
            88 => ErrorCode::Enotsock,
            89 => ErrorCode::Edestaddrreq,
            90 => ErrorCode::Emsgsize,
            94 => ErrorCode::Esocktnosupport,
            96 => ErrorCode::Epfnosupport,
            97 => ErrorCode::Eafnosupport,
            98 => ErrorCode::Eaddrinuse,
            99 => ErrorCode::Eaddrnotavail,
            100 => ErrorCode::Enetdown,
            101 => ErrorCode::Enetunreach,
            102 => ErrorCode::Enetreset,
            103 => ErrorCode::Econnaborted,
            104 => ErrorCode::Econnreset,
            110 => ErrorCode::Etimedout,
            111 => ErrorCode::Econnrefused,
            112 => ErrorCode::Ehostdown,
            113 => ErrorCode::Ehostunreach,
            _ => ErrorCode::Unknown,
        }
    }

    /// Maps an [`io::ErrorKind`] for errors that carry no errno.
    pub fn from_kind(kind: io::ErrorKind) -> Self {
        use io::ErrorKind::*;
        match kind {
            NotFound => ErrorCode::Enoent,
            PermissionDenied => ErrorCode::Eacces,
            ConnectionRefused => ErrorCode::Econnrefused,
            ConnectionReset => ErrorCode::Econnreset,
            HostUnreachable => ErrorCode::Ehostunreach,
            NetworkUnreachable => ErrorCode::Enetunreach,
            ConnectionAborted => ErrorCode::Econnaborted,
            NetworkDown => ErrorCode::Enetdown,
            AddrInUse => ErrorCode::Eaddrinuse,
            AddrNotAvailable => ErrorCode::Eaddrnotavail,
            BrokenPipe => ErrorCode::Epipe,
            AlreadyExists => ErrorCode::Eexist,
            WouldBlock => ErrorCode::Ewouldblock,
            NotADirectory => ErrorCode::Enotdir,
            IsADirectory => ErrorCode::Eisdir,
            DirectoryNotEmpty => ErrorCode::Enotempty,
            InvalidInput | InvalidData => ErrorCode::Einval,
            TimedOut => ErrorCode::Etimedout,
            Deadlock => ErrorCode::Edeadlk,
            InvalidFilename => ErrorCode::Enametoolong,
            Unsupported => ErrorCode::Enosys,
            _ => ErrorCode::Unknown,
        }
    }
}

impl From<&io::Error> for ErrorCode {
    fn from(err: &io::Error) -> Self {
        match err.raw_os_error() {
            Some(errno) => ErrorCode::from_errno(errno),
            None => ErrorCode::from_kind(err.kind()),
        }
    }
}

impl From<io::Error> for ErrorCode {
    fn from(err: io::Error) -> Self {
        ErrorCode::from(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_consecutive_from_one() {
        for (i, code) in ErrorCode::ALL.iter().enumerate() {
            assert_eq!(*code as u64, i as u64 + 1, "{code:?}");
            assert_eq!(ErrorCode::from_u64(*code as u64), Some(*code));
        }
        assert_eq!(ErrorCode::Ethreadnotstarted as u64, 53);
        assert_eq!(ErrorCode::Unknown as u64, u64::MAX);
        assert_eq!(ErrorCode::from_u64(0), None);
    }

    #[test]
    fn messages_are_lowercase() {
        for code in ErrorCode::ALL {
            let message = code.message();
            assert!(!message.is_empty());
            assert_eq!(message, message.to_lowercase());
        }
        assert_eq!(ErrorCode::Ebadf.to_string(), "bad file descriptor");
    }

    #[test]
    fn io_errors_map_by_errno_first() {
        assert_eq!(
            ErrorCode::from(io::Error::from_raw_os_error(2)),
            ErrorCode::Enoent
        );
        assert_eq!(
            ErrorCode::from(io::Error::from_raw_os_error(111)),
            ErrorCode::Econnrefused
        );
        assert_eq!(
            ErrorCode::from(io::Error::from_raw_os_error(4095)),
            ErrorCode::Unknown
        );
    }

    #[test]
    fn io_errors_map_by_kind_without_errno() {
        assert_eq!(
            ErrorCode::from(io::Error::from(io::ErrorKind::PermissionDenied)),
            ErrorCode::Eacces
        );
        assert_eq!(
            ErrorCode::from(io::Error::other("boom")),
            ErrorCode::Unknown
        );
    }
}
