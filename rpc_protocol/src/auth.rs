// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Call-level authentication.
//!
//! Only `AUTH_NONE` and `AUTH_SYS` are understood. Anything else is rejected with
//! `AUTH_ERROR(BAD_CRED)` before the call ever reaches a registered procedure.

use crate::codec::Cursor;
use crate::{AuthFlavor, AuthStat, OpaqueAuth, ProtocolError};

const MAX_MACHINE_NAME: usize = 255;
const MAX_GIDS: usize = 16;

/// Information about the caller, derived from its credential, that procedures and the oplock
/// layer key ownership checks off of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientInfo {
    /// `AUTH_NONE`: no identity asserted.
    Anonymous,
    /// `AUTH_SYS`: a unix-style uid/gid/gids credential.
    Unix { machine_name: String, uid: u32, gid: u32, gids: Vec<u32> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// The flavor isn't one this server understands.
    BadCredential,
    /// The credential body didn't decode as that flavor's expected shape.
    MalformedCredential,
}

impl AuthError {
    pub fn to_auth_stat(self) -> AuthStat {
        match self {
            Self::BadCredential => AuthStat::BadCred,
            Self::MalformedCredential => AuthStat::BadCred,
        }
    }
}

/// Resolves a call's credential into a [`ClientInfo`], or rejects it.
///
/// The default implementation ([`DefaultAuthenticator`]) handles `AUTH_NONE`/`AUTH_SYS`; callers
/// needing `RPCSEC_GSS` or another flavor provide their own.
pub trait Authenticator: Send + Sync {
    /// Called once, at server startup, before any call is authenticated. The default does
    /// nothing; an authenticator backed by an external directory would open its connection here.
    fn initialize(&self) {}

    /// Resolves `cred` into a session key (this implementation uses the resolved [`ClientInfo`]
    /// itself as the key, folding the two steps of the §4.9 contract together) or rejects the
    /// call with an [`AuthError`].
    fn authenticate(&self, cred: &OpaqueAuth) -> Result<ClientInfo, AuthError>;

    /// Expands a session key obtained from [`Self::authenticate`] back into the [`ClientInfo`]
    /// a procedure or the oplock layer keys ownership checks off of.
    fn client_info(&self, session_key: &ClientInfo) -> ClientInfo {
        session_key.clone()
    }

    /// The credential flavors this authenticator will accept in [`Self::authenticate`].
    fn supported_flavors(&self) -> Vec<u32>;

    /// Called once per call, after authentication succeeds and before the procedure runs, so an
    /// authenticator can install thread-local or session-scoped identity state a procedure
    /// implementation relies on. The default does nothing.
    fn set_current_user(&self, _client: &ClientInfo) {}
}

#[derive(Debug, Default)]
pub struct DefaultAuthenticator;

impl Authenticator for DefaultAuthenticator {
    fn authenticate(&self, cred: &OpaqueAuth) -> Result<ClientInfo, AuthError> {
        match cred.flavor {
            AuthFlavor::None => Ok(ClientInfo::Anonymous),
            AuthFlavor::Sys => decode_auth_sys(&cred.body).map_err(|_| AuthError::MalformedCredential),
            _ => Err(AuthError::BadCredential),
        }
    }

    fn supported_flavors(&self) -> Vec<u32> {
        vec![AuthFlavor::None.to_u32(), AuthFlavor::Sys.to_u32()]
    }
}

fn decode_auth_sys(body: &[u8]) -> Result<ClientInfo, ProtocolError> {
    let mut buf = body.to_vec();
    let mut cursor = Cursor::new(&mut buf);

    let _stamp = cursor.read_u32().map_err(|_| ProtocolError::MalformedMessage)?;
    let machine_name = cursor
        .read_string(MAX_MACHINE_NAME)
        .map_err(|_| ProtocolError::MalformedMessage)?;
    let uid = cursor.read_u32().map_err(|_| ProtocolError::MalformedMessage)?;
    let gid = cursor.read_u32().map_err(|_| ProtocolError::MalformedMessage)?;
    let gids = cursor
        .read_u32_array(MAX_GIDS)
        .map_err(|_| ProtocolError::MalformedMessage)?;

    Ok(ClientInfo::Unix { machine_name, uid, gid, gids })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Cursor as WriteCursor;

    fn encode_auth_sys(machine: &str, uid: u32, gid: u32, gids: &[u32]) -> Vec<u8> {
        let mut buf = vec![0u8; 256];
        let mut c = WriteCursor::new(&mut buf);
        c.write_u32(0).unwrap();
        c.write_string(machine).unwrap();
        c.write_u32(uid).unwrap();
        c.write_u32(gid).unwrap();
        c.write_u32_array(gids).unwrap();
        let len = c.position();
        buf.truncate(len);
        buf
    }

    #[test]
    fn none_is_anonymous() {
        let auth = DefaultAuthenticator;
        assert_eq!(auth.authenticate(&OpaqueAuth::none()).unwrap(), ClientInfo::Anonymous);
    }

    #[test]
    fn sys_decodes_identity() {
        let body = encode_auth_sys("client.example", 1000, 100, &[100, 200]);
        let cred = OpaqueAuth { flavor: AuthFlavor::Sys, body };
        let auth = DefaultAuthenticator;
        let info = auth.authenticate(&cred).unwrap();
        assert_eq!(
            info,
            ClientInfo::Unix { machine_name: "client.example".into(), uid: 1000, gid: 100, gids: vec![100, 200] }
        );
    }

    #[test]
    fn unsupported_flavor_rejected() {
        let cred = OpaqueAuth { flavor: AuthFlavor::RpcSecGss, body: Vec::new() };
        let auth = DefaultAuthenticator;
        assert_eq!(auth.authenticate(&cred).unwrap_err(), AuthError::BadCredential);
    }
}
