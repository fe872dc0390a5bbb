// SPDX-FileCopyrightText: 2023 Jade Lovelace
//
// SPDX-License-Identifier: MPL-2.0

use nix::errno::Errno;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}: {1}")]
    Errno(&'static str, Errno),
    #[error("{0}: {1}")]
    IoError(&'static str, std::io::Error),
    #[error("no such interface: {0:?}")]
    NoSuchInterface(String),
    #[error("bad capture configuration: {0}")]
    Config(String),
    #[error("serializing {0}: {1}")]
    Encode(&'static str, String),
}

pub(crate) trait AddContext<T> {
    fn context(self, s: &'static str) -> Result<T, Error>;
}

impl<T> AddContext<T> for Result<T, Errno> {
    fn context(self, s: &'static str) -> Result<T, Error> {
        self.map_err(|e| Error::Errno(s, e))
    }
}

impl<T> AddContext<T> for Result<T, std::io::Error> {
    fn context(self, s: &'static str) -> Result<T, Error> {
        self.map_err(|e| Error::IoError(s, e))
    }
}
