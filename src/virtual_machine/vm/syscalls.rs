//! Host services reached through `SYSCALL`.
//!
//! The service index is read from `x15` and arguments from `x0..x3`. A
//! successful call writes its result to `x0`; a failing one writes the
//! [`ErrorCode`] to `er` and `u64::MAX` to `x0`. Guest memory ranges are
//! validated before any host I/O happens.

use super::descriptors::Descriptor;
use super::error_code::ErrorCode;
use super::registers::{ER, FP, Registers, X0, X1, X2, X3, X15};
use super::Cpu;
use crate::debug;
use crate::virtual_machine::errors::VMError;
use std::fs::OpenOptions;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::time::{SystemTime, UNIX_EPOCH};

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

type SyscallResult = Result<u64, ErrorCode>;

const O_ACCMODE: u64 = 0x3;
const O_WRONLY: u64 = 0x1;
const O_RDWR: u64 = 0x2;
const O_CREAT: u64 = 0x40;
const O_EXCL: u64 = 0x80;
const O_TRUNC: u64 = 0x200;
const O_APPEND: u64 = 0x400;

/// `type u8, ipv4[4], port u16`.
const NET_OPTS_LEN: u64 = 7;
/// `ipv4[4], port u16`.
const PEER_NAME_LEN: u64 = 6;

/// Plain TCP, resolved over IPv4 like [`SOCKET_TCP4`].
const SOCKET_TCP: u8 = 0;
const SOCKET_TCP4: u8 = 1;
const SOCKET_TCP6: u8 = 2;

#[repr(u64)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Syscall {
    Exit = 1,
    Open = 2,
    Read = 3,
    Write = 4,
    Close = 5,
    Strerr = 6,
    IntToStr = 7,
    StrToInt = 8,
    Clock = 9,
    NetListenTcp = 10,
    NetConnectTcp = 11,
    NetAccept = 12,
    NetGetpeername = 13,
    NetIpToStr = 14,
    ThreadSpawn = 15,
    ThreadStart = 16,
    ThreadStop = 17,
    ThreadJoin = 18,
}

impl Syscall {
    fn from_index(index: u64) -> Option<Self> {
        Some(match index {
            1 => Syscall::Exit,
            2 => Syscall::Open,
            3 => Syscall::Read,
            4 => Syscall::Write,
            5 => Syscall::Close,
            6 => Syscall::Strerr,
            7 => Syscall::IntToStr,
            8 => Syscall::StrToInt,
            9 => Syscall::Clock,
            10 => Syscall::NetListenTcp,
            11 => Syscall::NetConnectTcp,
            12 => Syscall::NetAccept,
            13 => Syscall::NetGetpeername,
            14 => Syscall::NetIpToStr,
            15 => Syscall::ThreadSpawn,
            16 => Syscall::ThreadStart,
            17 => Syscall::ThreadStop,
            18 => Syscall::ThreadJoin,
            _ => return None,
        })
    }
}

impl Cpu<'_> {
    pub(super) fn syscall(&mut self) -> Result<(), VMError> {
        let index = self.regs.get(X15)?;
        let Some(call) = Syscall::from_index(index) else {
            debug!("thread {}: unknown syscall {index}", self.thread.index());
            return self.regs.set(ER, ErrorCode::UnknownSyscall as u64);
        };

        match self.invoke(call) {
            Ok(value) => self.regs.set(X0, value),
            Err(code) => {
                debug!("thread {}: {call:?} failed: {code}", self.thread.index());
                self.regs.set(ER, code as u64)?;
                self.regs.set(X0, u64::MAX)
            }
        }
    }

    fn invoke(&mut self, call: Syscall) -> SyscallResult {
        match call {
            Syscall::Exit => self.sys_exit(),
            Syscall::Open => self.sys_open(),
            Syscall::Read => self.sys_read(),
            Syscall::Write => self.sys_write(),
            Syscall::Close => self.sys_close(),
            Syscall::Strerr => self.sys_strerr(),
            Syscall::IntToStr => self.sys_int_to_str(),
            Syscall::StrToInt => self.sys_str_to_int(),
            Syscall::Clock => Ok(SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |elapsed| elapsed.as_millis() as u64)),
            Syscall::NetListenTcp => self.sys_net_listen_tcp(),
            Syscall::NetConnectTcp => self.sys_net_connect_tcp(),
            Syscall::NetAccept => self.sys_net_accept(),
            Syscall::NetGetpeername => self.sys_net_getpeername(),
            Syscall::NetIpToStr => self.sys_net_ip_to_str(),
            Syscall::ThreadSpawn => self.sys_thread_spawn(),
            Syscall::ThreadStart => self.sys_thread_start(),
            Syscall::ThreadStop => self.sys_thread_stop(),
            Syscall::ThreadJoin => self.sys_thread_join(),
        }
    }

    /// Argument registers are fixed indices inside the register file.
    fn arg(&self, index: u8) -> u64 {
        self.regs.get(index).unwrap_or_default()
    }

    /// Checks that `[address, address + len)` is a non-empty range in memory.
    fn check_range(&self, address: u64, len: u64) -> Result<(), ErrorCode> {
        if len == 0 {
            return Err(ErrorCode::Einvalidlength);
        }
        if !self.machine.memory.contains(address, len) {
            return Err(ErrorCode::Eaddroutofbounds);
        }
        Ok(())
    }

    fn guest_bytes(&self, address: u64, len: u64) -> Result<Vec<u8>, ErrorCode> {
        self.check_range(address, len)?;
        self.machine
            .memory
            .read(address, len as usize)
            .map_err(|_| ErrorCode::Eaddroutofbounds)
    }

    fn guest_str(&self, address: u64, len: u64) -> Result<String, ErrorCode> {
        String::from_utf8(self.guest_bytes(address, len)?).map_err(|_| ErrorCode::Einval)
    }

    /// Copies `text` into a guest buffer of `capacity` bytes.
    fn write_guest_str(&self, address: u64, capacity: u64, text: &str) -> SyscallResult {
        self.check_range(address, capacity)?;
        if text.len() as u64 > capacity {
            return Err(ErrorCode::Einvalidlength);
        }
        self.machine
            .memory
            .write(address, text.as_bytes())
            .map_err(|_| ErrorCode::Eaddroutofbounds)?;
        Ok(text.len() as u64)
    }

    fn sys_exit(&mut self) -> SyscallResult {
        let status = self.arg(X0);
        self.machine.exit(status);
        Ok(status)
    }

    fn sys_open(&mut self) -> SyscallResult {
        let path = self.guest_str(self.arg(X0), self.arg(X1))?;
        let flags = self.arg(X2);

        let mut options = OpenOptions::new();
        match flags & O_ACCMODE {
            O_WRONLY => options.write(true),
            O_RDWR => options.read(true).write(true),
            _ => options.read(true),
        };
        if flags & O_APPEND != 0 {
            options.append(true);
        }
        if flags & O_TRUNC != 0 {
            options.truncate(true);
        }
        if flags & O_CREAT != 0 {
            if flags & O_EXCL != 0 {
                options.create_new(true);
            } else {
                options.create(true);
            }
        }
        #[cfg(unix)]
        options.mode(self.arg(X3) as u32);

        let file = options.open(&path)?;
        let fd = self.machine.descriptors.insert(Descriptor::File(file));
        debug!("opened {path} as fd {fd}");
        Ok(fd)
    }

    fn sys_read(&mut self) -> SyscallResult {
        let (fd, address, len) = (self.arg(X0), self.arg(X1), self.arg(X2));
        self.check_range(address, len)?;
        let descriptor = self.machine.descriptors.get(fd)?;

        let mut buf = vec![0; len as usize];
        let read = descriptor.read(&mut buf)?;
        self.machine
            .memory
            .write(address, &buf[..read])
            .map_err(|_| ErrorCode::Eaddroutofbounds)?;
        Ok(read as u64)
    }

    fn sys_write(&mut self) -> SyscallResult {
        let (fd, address, len) = (self.arg(X0), self.arg(X1), self.arg(X2));
        let data = self.guest_bytes(address, len)?;
        let descriptor = self.machine.descriptors.get(fd)?;
        Ok(descriptor.write(&data)? as u64)
    }

    fn sys_close(&mut self) -> SyscallResult {
        self.machine.descriptors.remove(self.arg(X0))?;
        Ok(0)
    }

    fn sys_strerr(&mut self) -> SyscallResult {
        let er = self.arg(ER);
        let message = match ErrorCode::from_u64(er) {
            Some(code) => code.message().to_string(),
            None => format!("unknown error {er}"),
        };
        self.write_guest_str(self.arg(X0), self.arg(X1), &message)
    }

    fn sys_int_to_str(&mut self) -> SyscallResult {
        let text = (self.arg(X0) as i64).to_string();
        self.write_guest_str(self.arg(X1), self.arg(X2), &text)
    }

    fn sys_str_to_int(&mut self) -> SyscallResult {
        let text = self.guest_str(self.arg(X0), self.arg(X1))?;
        let text = text.trim();
        text.parse::<i64>()
            .map(|value| value as u64)
            .or_else(|_| text.parse::<u64>())
            .map_err(|_| ErrorCode::Einval)
    }

    /// Decodes the 7-byte socket options struct at `address`.
    fn net_opts(&self, address: u64) -> Result<SocketAddr, ErrorCode> {
        let opts = self.guest_bytes(address, NET_OPTS_LEN)?;
        let ip = Ipv4Addr::new(opts[1], opts[2], opts[3], opts[4]);
        let port = u16::from_be_bytes([opts[5], opts[6]]);
        match opts[0] {
            SOCKET_TCP | SOCKET_TCP4 => Ok(SocketAddr::new(IpAddr::V4(ip), port)),
            SOCKET_TCP6 => Ok(SocketAddr::new(IpAddr::V6(ip.to_ipv6_mapped()), port)),
            _ => Err(ErrorCode::Esocktnosupport),
        }
    }

    fn sys_net_listen_tcp(&mut self) -> SyscallResult {
        let address = self.net_opts(self.arg(X0))?;
        let listener = TcpListener::bind(address)?;
        let fd = self.machine.descriptors.insert(Descriptor::Listener(listener));
        debug!("listening on {address} as fd {fd}");
        Ok(fd)
    }

    fn sys_net_connect_tcp(&mut self) -> SyscallResult {
        let address = self.net_opts(self.arg(X0))?;
        let stream = TcpStream::connect(address)?;
        let fd = self.machine.descriptors.insert(Descriptor::Stream(stream));
        debug!("connected to {address} as fd {fd}");
        Ok(fd)
    }

    fn sys_net_accept(&mut self) -> SyscallResult {
        let listener = self.machine.descriptors.get(self.arg(X0))?;
        let stream = listener.accept()?;
        Ok(self.machine.descriptors.insert(Descriptor::Stream(stream)))
    }

    fn sys_net_getpeername(&mut self) -> SyscallResult {
        let out = self.arg(X1);
        self.check_range(out, PEER_NAME_LEN)?;
        let peer = self.machine.descriptors.get(self.arg(X0))?.peer_addr()?;
        let ip = match peer.ip() {
            IpAddr::V4(ip) => ip,
            IpAddr::V6(ip) => ip.to_ipv4_mapped().ok_or(ErrorCode::Ebadhostaddress)?,
        };

        let mut name = [0u8; PEER_NAME_LEN as usize];
        name[..4].copy_from_slice(&ip.octets());
        name[4..].copy_from_slice(&peer.port().to_be_bytes());
        self.machine
            .memory
            .write(out, &name)
            .map_err(|_| ErrorCode::Eaddroutofbounds)?;
        Ok(0)
    }

    fn sys_net_ip_to_str(&mut self) -> SyscallResult {
        let octets = self.guest_bytes(self.arg(X0), 4)?;
        let ip = Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]);
        self.write_guest_str(self.arg(X1), self.arg(X2), &ip.to_string())
    }

    fn sys_thread_spawn(&mut self) -> SyscallResult {
        let (entry, stack_top, argument) = (self.arg(X0), self.arg(X1), self.arg(X2));
        let mut registers = Registers::new();
        registers.set_ip(entry);
        registers.set_sp(stack_top);
        registers
            .set(FP, stack_top)
            .and_then(|_| registers.set(X0, argument))
            .map_err(|_| ErrorCode::Efailedcreate)?;
        Ok(self.machine.spawn_thread(registers))
    }

    fn sys_thread_start(&mut self) -> SyscallResult {
        self.machine.start_thread(self.arg(X0))?;
        Ok(0)
    }

    fn sys_thread_stop(&mut self) -> SyscallResult {
        let thread = self
            .machine
            .thread(self.arg(X0))
            .ok_or(ErrorCode::Enothread)?;
        thread.stop();
        Ok(0)
    }

    fn sys_thread_join(&mut self) -> SyscallResult {
        let index = self.arg(X0);
        if index == self.thread.index() {
            return Err(ErrorCode::Edeadlk);
        }
        let thread = self.machine.thread(index).ok_or(ErrorCode::Enothread)?;
        thread.join()?;
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syscall_indices_match_table() {
        assert_eq!(Syscall::from_index(0), None);
        assert_eq!(Syscall::from_index(1), Some(Syscall::Exit));
        assert_eq!(Syscall::from_index(14), Some(Syscall::NetIpToStr));
        assert_eq!(Syscall::from_index(18), Some(Syscall::ThreadJoin));
        assert_eq!(Syscall::from_index(19), None);
        for index in 1..=18 {
            let call = Syscall::from_index(index).unwrap();
            assert_eq!(call as u64, index);
        }
    }
}
