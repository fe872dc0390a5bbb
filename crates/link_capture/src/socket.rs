// SPDX-FileCopyrightText: 2023 Jade Lovelace
//
// SPDX-License-Identifier: MPL-2.0

//! The raw `AF_PACKET` capture socket on Linux.
//!
//! Needs `CAP_NET_RAW`.

use std::{
    io::{self, IoSliceMut},
    mem,
    os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd},
};

use nix::{
    errno::Errno,
    ioctl_readwrite_bad,
    libc::{self, c_int},
    sys::socket::{bind, recvmsg, setsockopt, sockopt, LinkAddr, MsgFlags, SockaddrLike},
};
use tokio::io::unix::AsyncFd;

use crate::{
    capture::{FrameSource, Received, RecvError},
    error::AddContext,
    Error, InterfaceSelector,
};

ioctl_readwrite_bad!(get_if_index, libc::SIOCGIFINDEX, libc::ifreq);

/// `ETH_P_ALL` in network byte order, as both `socket(2)` and `sockaddr_ll`
/// want it.
fn eth_p_all() -> u16 {
    (libc::ETH_P_ALL as u16).to_be()
}

/// Looks up the kernel interface index, using `fd` for the ioctl.
///
/// Index 0 means every interface.
fn interface_index(fd: RawFd, interface: &InterfaceSelector) -> Result<c_int, Error> {
    let name = match interface {
        InterfaceSelector::Any => return Ok(0),
        InterfaceSelector::Named(name) => name,
    };
    let no_such = || Error::NoSuchInterface(name.clone());

    let mut ifr: libc::ifreq = unsafe { mem::zeroed() };

    // needs to fit with its NUL terminator
    if name.is_empty() || name.len() >= ifr.ifr_name.len() || name.as_bytes().contains(&0) {
        return Err(no_such());
    }
    for (dst, &src) in ifr.ifr_name.iter_mut().zip(name.as_bytes()) {
        *dst = src as libc::c_char;
    }

    match unsafe { get_if_index(fd, &mut ifr) } {
        Ok(_) => Ok(unsafe { ifr.ifr_ifru.ifru_ifindex }),
        Err(Errno::ENODEV) => Err(no_such()),
        Err(e) => Err(Error::Errno("get interface index", e)),
    }
}

/// The `sockaddr_ll` to bind to: all protocols on interface `ifindex`.
fn link_addr(ifindex: c_int) -> Result<LinkAddr, Error> {
    let mut sll: libc::sockaddr_ll = unsafe { mem::zeroed() };
    sll.sll_family = libc::AF_PACKET as u16;
    sll.sll_protocol = eth_p_all();
    sll.sll_ifindex = ifindex;

    unsafe {
        LinkAddr::from_raw(
            &sll as *const _ as *const libc::sockaddr,
            Some(mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t),
        )
    }
    .ok_or(Error::Errno("build sockaddr_ll", Errno::EINVAL))
}

/// Opens a raw packet socket for all protocols, turns on nanosecond receive
/// timestamps and binds it to the selected interface.
///
/// On error the socket is closed again.
pub fn make_capture_socket(interface: &InterfaceSelector) -> Result<(OwnedFd, c_int), Error> {
    let raw = Errno::result(unsafe {
        libc::socket(
            libc::AF_PACKET,
            libc::SOCK_RAW | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
            eth_p_all() as c_int,
        )
    })
    .context("socket(AF_PACKET, SOCK_RAW, ETH_P_ALL)")?;
    let capture_sock = unsafe { OwnedFd::from_raw_fd(raw) };

    let ifindex = interface_index(capture_sock.as_raw_fd(), interface)?;

    setsockopt(capture_sock.as_raw_fd(), sockopt::ReceiveTimestampns, &true)
        .context("setsockopt(SO_TIMESTAMPNS)")?;

    let sll = link_addr(ifindex)?;
    bind(capture_sock.as_raw_fd(), &sll).context("bind capture socket")?;

    Ok((capture_sock, ifindex))
}

pub struct CaptureSocket {
    fd: AsyncFd<OwnedFd>,
    ifindex: c_int,
}

impl CaptureSocket {
    pub fn open(interface: &InterfaceSelector) -> Result<CaptureSocket, Error> {
        let (fd, ifindex) = make_capture_socket(interface)?;
        Ok(CaptureSocket {
            fd: AsyncFd::new(fd).context("register capture socket")?,
            ifindex,
        })
    }

    pub fn ifindex(&self) -> c_int {
        self.ifindex
    }
}

fn recvmsg_frame(fd: RawFd, frame: &mut [u8], control: &mut Vec<u8>) -> io::Result<Received> {
    // MSG_TRUNC makes the return value the length of the frame on the wire
    // rather than how much of it fit into `frame`.
    let mut iov = [IoSliceMut::new(frame)];
    let msg = recvmsg::<LinkAddr>(
        fd,
        &mut iov,
        Some(control),
        MsgFlags::MSG_DONTWAIT | MsgFlags::MSG_TRUNC,
    )
    .map_err(io::Error::from)?;

    let control = if msg.flags.contains(MsgFlags::MSG_CTRUNC) {
        tracing::debug!("control messages truncated");
        None
    } else {
        msg.cmsgs().next()
    };

    Ok(Received {
        len: msg.bytes,
        control,
    })
}

impl FrameSource for CaptureSocket {
    async fn recv_frame(
        &mut self,
        frame: &mut [u8],
        control: &mut Vec<u8>,
    ) -> Result<Received, RecvError> {
        loop {
            let mut guard = self.fd.readable().await.map_err(RecvError::from)?;

            match guard.try_io(|inner| recvmsg_frame(inner.as_raw_fd(), frame, control)) {
                Ok(result) => return result.map_err(RecvError::from),
                Err(_would_block) => continue,
            }
        }
    }
}
