// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Program/version/procedure dispatch.
//!
//! [`RpcDispatcher`] holds a registry of `(program, version) -> procedure table` and implements
//! the reply-selection algorithm a conforming ONC/RPC server must follow: resolve program, then
//! version, then authenticate, then procedure, building the one correct accept/reject reply at
//! whichever step first fails. Program/version resolution comes before authentication so that an
//! unauthenticated call to an unknown program or version still gets `PROG_UNAVAIL`/
//! `PROG_MISMATCH` rather than `AUTH_ERROR`.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};

use crate::auth::{AuthError, Authenticator, ClientInfo};
use crate::{
    AcceptedReplyBody, Call, ProgMismatchBody, ReplyBody,
};

/// The result a registered procedure hands back to the dispatcher.
pub enum ProcResult {
    /// Fully XDR-encoded, 4-byte-padded result bytes.
    Success(Vec<u8>),
    /// The argument bytes didn't decode as this procedure expects.
    GarbageArgs,
    /// The procedure failed for a reason unrelated to the RPC envelope itself (e.g. an I/O error
    /// reaching the underlying resource it fronts).
    SystemErr,
}

/// A registered procedure implementation. Procedures receive the decoded call (for its raw
/// argument bytes) and the caller's resolved identity.
pub type Procedure = Arc<dyn Fn(&Call, &ClientInfo) -> ProcResult + Send + Sync>;

struct VersionEntry {
    procedures: Vec<Option<Procedure>>,
}

struct ProgramEntry {
    version_min: u32,
    version_max: u32,
    versions: HashMap<u32, VersionEntry>,
}

/// The program/version/procedure registry plus the authenticator consulted before any procedure
/// runs.
pub struct RpcDispatcher {
    programs: HashMap<u32, ProgramEntry>,
    authenticator: Arc<dyn Authenticator>,
}

impl RpcDispatcher {
    pub fn new(authenticator: Arc<dyn Authenticator>) -> Self {
        Self { programs: HashMap::new(), authenticator }
    }

    /// Registers procedures `0..procedures.len()` for `(program, version)`. Procedure `0` is
    /// conventionally the no-op `NULL` probe and is expected to be present for every
    /// program/version pair that's registered.
    pub fn register(&mut self, program: u32, version: u32, procedures: Vec<Option<Procedure>>) {
        let entry = self.programs.entry(program).or_insert_with(|| ProgramEntry {
            version_min: version,
            version_max: version,
            versions: HashMap::new(),
        });
        entry.version_min = entry.version_min.min(version);
        entry.version_max = entry.version_max.max(version);
        entry.versions.insert(version, VersionEntry { procedures });
    }

    /// Runs the full dispatch algorithm and returns the complete reply message, already
    /// record-mark-free (the transport layer adds framing).
    pub fn dispatch(&self, call: &Call) -> Vec<u8> {
        let xid = call.xid();

        let Some(program) = self.programs.get(&call.program()) else {
            debug!("xid={xid} program {} unavailable", call.program());
            return crate::encode_reply(xid, ReplyBody::accepted(AcceptedReplyBody::ProgUnavail));
        };

        let Some(version) = program.versions.get(&call.version()) else {
            debug!(
                "xid={xid} program {} version {} mismatch (have {}..={})",
                call.program(),
                call.version(),
                program.version_min,
                program.version_max
            );
            return crate::encode_reply(
                xid,
                ReplyBody::accepted(AcceptedReplyBody::ProgMismatch(ProgMismatchBody {
                    low: program.version_min,
                    high: program.version_max,
                })),
            );
        };

        let client_info = match self.authenticator.authenticate(call.credential()) {
            Ok(info) => info,
            Err(err) => {
                debug!("xid={xid} authentication rejected: {err:?}");
                return crate::encode_reply(xid, ReplyBody::auth_error(auth_error_stat(err)));
            }
        };
        self.authenticator.set_current_user(&client_info);

        let Some(Some(procedure)) = version.procedures.get(call.procedure() as usize) else {
            debug!("xid={xid} procedure {} unavailable", call.procedure());
            return crate::encode_reply(xid, ReplyBody::accepted(AcceptedReplyBody::ProcUnavail));
        };

        match procedure(call, &client_info) {
            ProcResult::Success(result) => crate::encode_success_reply(xid, &result),
            ProcResult::GarbageArgs => {
                warn!("xid={xid} procedure {} rejected garbage arguments", call.procedure());
                crate::encode_reply(xid, ReplyBody::accepted(AcceptedReplyBody::GarbageArgs))
            }
            ProcResult::SystemErr => {
                warn!("xid={xid} procedure {} failed with a system error", call.procedure());
                crate::encode_reply(xid, ReplyBody::accepted(AcceptedReplyBody::SystemErr))
            }
        }
    }
}

fn auth_error_stat(err: AuthError) -> crate::AuthStat {
    err.to_auth_stat()
}

/// A `NULL` procedure implementation suitable for registering at index 0 of any program/version:
/// takes no argument, returns an empty success reply.
pub fn null_procedure(_call: &Call, _client: &ClientInfo) -> ProcResult {
    ProcResult::Success(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::DefaultAuthenticator;
    use crate::{decode_call, encode_call_header, OpaqueAuth};

    fn make_call_bytes(program: u32, version: u32, proc: u32) -> Vec<u8> {
        encode_call_header(42, program, version, proc, OpaqueAuth::none(), OpaqueAuth::none())
    }

    #[test]
    fn null_procedure_round_trips() {
        let mut dispatcher = RpcDispatcher::new(Arc::new(DefaultAuthenticator));
        dispatcher.register(1, 1, vec![Some(Arc::new(null_procedure))]);

        let bytes = make_call_bytes(1, 1, 0);
        let call = decode_call(&bytes).unwrap();
        let reply = dispatcher.dispatch(&call);
        assert!(!reply.is_empty());
    }

    #[test]
    fn unknown_program_is_prog_unavail() {
        let dispatcher = RpcDispatcher::new(Arc::new(DefaultAuthenticator));
        let bytes = make_call_bytes(999, 1, 0);
        let call = decode_call(&bytes).unwrap();
        let reply = dispatcher.dispatch(&call);

        let mut rest: &[u8] = &reply;
        let decoded = crate::test_support::decode_reply(&mut rest);
        assert!(matches!(decoded, ReplyBody::Accepted(a) if matches!(a.reply_data, AcceptedReplyBody::ProgUnavail)));
    }

    #[test]
    fn unknown_version_is_prog_mismatch() {
        let mut dispatcher = RpcDispatcher::new(Arc::new(DefaultAuthenticator));
        dispatcher.register(1, 2, vec![Some(Arc::new(null_procedure))]);

        let bytes = make_call_bytes(1, 5, 0);
        let call = decode_call(&bytes).unwrap();
        let reply = dispatcher.dispatch(&call);

        let mut rest: &[u8] = &reply;
        let decoded = crate::test_support::decode_reply(&mut rest);
        match decoded {
            ReplyBody::Accepted(a) => match a.reply_data {
                AcceptedReplyBody::ProgMismatch(m) => {
                    assert_eq!(m.low, 2);
                    assert_eq!(m.high, 2);
                }
                other => panic!("unexpected reply data: {other:?}"),
            },
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn unregistered_procedure_is_proc_unavail() {
        let mut dispatcher = RpcDispatcher::new(Arc::new(DefaultAuthenticator));
        dispatcher.register(1, 1, vec![Some(Arc::new(null_procedure))]);

        let bytes = make_call_bytes(1, 1, 7);
        let call = decode_call(&bytes).unwrap();
        let reply = dispatcher.dispatch(&call);

        let mut rest: &[u8] = &reply;
        let decoded = crate::test_support::decode_reply(&mut rest);
        assert!(matches!(decoded, ReplyBody::Accepted(a) if matches!(a.reply_data, AcceptedReplyBody::ProcUnavail)));
    }

    #[test]
    fn unknown_program_wins_over_bad_auth() {
        // Program/version resolution must happen before authentication: an unauthenticated call
        // to a program nobody registered is PROG_UNAVAIL, never AUTH_ERROR.
        let dispatcher = RpcDispatcher::new(Arc::new(DefaultAuthenticator));
        let bad_cred = OpaqueAuth { flavor: crate::AuthFlavor::RpcSecGss, body: Vec::new() };
        let bytes = encode_call_header(1, 999, 1, 0, bad_cred, OpaqueAuth::none());
        let call = decode_call(&bytes).unwrap();
        let reply = dispatcher.dispatch(&call);

        let mut rest: &[u8] = &reply;
        let decoded = crate::test_support::decode_reply(&mut rest);
        assert!(matches!(decoded, ReplyBody::Accepted(a) if matches!(a.reply_data, AcceptedReplyBody::ProgUnavail)));
    }

    #[test]
    fn unknown_version_wins_over_bad_auth() {
        let mut dispatcher = RpcDispatcher::new(Arc::new(DefaultAuthenticator));
        dispatcher.register(1, 2, vec![Some(Arc::new(null_procedure))]);

        let bad_cred = OpaqueAuth { flavor: crate::AuthFlavor::RpcSecGss, body: Vec::new() };
        let bytes = encode_call_header(1, 1, 9, 0, bad_cred, OpaqueAuth::none());
        let call = decode_call(&bytes).unwrap();
        let reply = dispatcher.dispatch(&call);

        let mut rest: &[u8] = &reply;
        let decoded = crate::test_support::decode_reply(&mut rest);
        assert!(matches!(decoded, ReplyBody::Accepted(a) if matches!(a.reply_data, AcceptedReplyBody::ProgMismatch(_))));
    }

    #[test]
    fn bad_auth_flavor_is_auth_error() {
        let mut dispatcher = RpcDispatcher::new(Arc::new(DefaultAuthenticator));
        dispatcher.register(1, 1, vec![Some(Arc::new(null_procedure))]);

        let bad_cred = OpaqueAuth { flavor: crate::AuthFlavor::RpcSecGss, body: Vec::new() };
        let bytes = encode_call_header(1, 1, 1, 0, bad_cred, OpaqueAuth::none());
        let call = decode_call(&bytes).unwrap();
        let reply = dispatcher.dispatch(&call);

        let mut rest: &[u8] = &reply;
        let decoded = crate::test_support::decode_reply(&mut rest);
        assert!(matches!(decoded, ReplyBody::Denied(_)));
    }
}
