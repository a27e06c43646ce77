use super::error_code::ErrorCode;
use dashmap::DashMap;
use std::fs::File;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// First descriptor handed out after the standard streams.
const FIRST_FREE_FD: u64 = 3;

/// Host resource behind a guest file descriptor.
#[derive(Debug)]
pub enum Descriptor {
    Stdin,
    Stdout,
    Stderr,
    File(File),
    Listener(TcpListener),
    Stream(TcpStream),
}

impl Descriptor {
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, ErrorCode> {
        let result = match self {
            Descriptor::Stdin => io::stdin().read(buf),
            Descriptor::File(file) => (&*file).read(buf),
            Descriptor::Stream(stream) => (&*stream).read(buf),
            Descriptor::Stdout | Descriptor::Stderr | Descriptor::Listener(_) => {
                return Err(ErrorCode::Ebadf);
            }
        };
        result.map_err(ErrorCode::from)
    }

    pub fn write(&self, buf: &[u8]) -> Result<usize, ErrorCode> {
        let result = match self {
            Descriptor::Stdout => {
                let mut out = io::stdout().lock();
                out.write(buf).and_then(|n| out.flush().map(|_| n))
            }
            Descriptor::Stderr => io::stderr().write(buf),
            Descriptor::File(file) => (&*file).write(buf),
            Descriptor::Stream(stream) => (&*stream).write(buf),
            Descriptor::Stdin | Descriptor::Listener(_) => return Err(ErrorCode::Ebadf),
        };
        result.map_err(ErrorCode::from)
    }

    /// Accepts one connection on a listener.
    pub fn accept(&self) -> Result<TcpStream, ErrorCode> {
        match self {
            Descriptor::Listener(listener) => listener
                .accept()
                .map(|(stream, _)| stream)
                .map_err(ErrorCode::from),
            Descriptor::Stream(_) => Err(ErrorCode::Einval),
            _ => Err(ErrorCode::Enotsock),
        }
    }

    /// Remote address of a connected stream.
    pub fn peer_addr(&self) -> Result<SocketAddr, ErrorCode> {
        match self {
            Descriptor::Stream(stream) => stream.peer_addr().map_err(ErrorCode::from),
            _ => Err(ErrorCode::Enotsock),
        }
    }
}

/// Guest descriptor table. `0`, `1` and `2` start out as the host's standard streams.
#[derive(Debug)]
pub struct Descriptors {
    table: DashMap<u64, Arc<Descriptor>>,
    next: AtomicU64,
}

impl Default for Descriptors {
    fn default() -> Self {
        let table = DashMap::new();
        table.insert(0, Arc::new(Descriptor::Stdin));
        table.insert(1, Arc::new(Descriptor::Stdout));
        table.insert(2, Arc::new(Descriptor::Stderr));
        Self {
            table,
            next: AtomicU64::new(FIRST_FREE_FD),
        }
    }
}

impl Descriptors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a resource and returns its descriptor.
    pub fn insert(&self, descriptor: Descriptor) -> u64 {
        let fd = self.next.fetch_add(1, Ordering::Relaxed);
        self.table.insert(fd, Arc::new(descriptor));
        fd
    }

    /// Looks a descriptor up. The map guard is released before returning so
    /// blocking I/O never holds a shard lock.
    pub fn get(&self, fd: u64) -> Result<Arc<Descriptor>, ErrorCode> {
        self.table
            .get(&fd)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(ErrorCode::Ebadf)
    }

    /// Drops the table's handle; the host resource closes with its last user.
    pub fn remove(&self, fd: u64) -> Result<(), ErrorCode> {
        self.table
            .remove(&fd)
            .map(|_| ())
            .ok_or(ErrorCode::Ebadf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_streams_are_preopened() {
        let descriptors = Descriptors::new();
        assert_eq!(descriptors.table.len(), 3);
        assert!(matches!(*descriptors.get(0).unwrap(), Descriptor::Stdin));
        assert!(matches!(*descriptors.get(2).unwrap(), Descriptor::Stderr));
    }

    #[test]
    fn insert_allocates_after_stdio() {
        let descriptors = Descriptors::new();
        let file = tempfile::tempfile().unwrap();
        assert_eq!(descriptors.insert(Descriptor::File(file)), 3);
    }

    #[test]
    fn remove_and_missing() {
        let descriptors = Descriptors::new();
        descriptors.remove(1).unwrap();
        assert_eq!(descriptors.get(1).unwrap_err(), ErrorCode::Ebadf);
        assert_eq!(descriptors.remove(1), Err(ErrorCode::Ebadf));
        assert_eq!(descriptors.get(99).unwrap_err(), ErrorCode::Ebadf);
    }

    #[test]
    fn file_read_write() {
        let descriptors = Descriptors::new();
        let fd = descriptors.insert(Descriptor::File(tempfile::tempfile().unwrap()));
        let file = descriptors.get(fd).unwrap();
        assert_eq!(file.write(b"abc").unwrap(), 3);
        assert_eq!(Descriptor::Stdin.write(b"x"), Err(ErrorCode::Ebadf));
        assert_eq!(Descriptor::Stdout.read(&mut [0; 1]), Err(ErrorCode::Ebadf));
    }

    #[test]
    fn accept_requires_listener() {
        assert_eq!(Descriptor::Stdin.accept().unwrap_err(), ErrorCode::Enotsock);
        assert_eq!(Descriptor::Stdout.peer_addr().unwrap_err(), ErrorCode::Enotsock);
    }
}
