//! Master server, server list retrieval side.
//!
//! This library implements the query side of a legacy game-client
//! discovery protocol. Game clients open a TCP connection, send one
//! NUL-delimited request naming the game, an 8-character validation token,
//! an optional filter expression and the record fields they want, and get
//! back a binary-packed, cipher-obfuscated list of matching registered
//! servers.
//!
//! ## Request Pipeline
//!
//! Every accepted connection runs the same cycle:
//!
//! 1. **Receive**: one receive event is treated as one complete request
//!    (`network`); requests are never reassembled across events.
//! 2. **Parse**: the token run is decoded into validation token, raw
//!    filter and field list (`request`); anything malformed is silently
//!    dropped because the protocol has no error-response form.
//! 3. **Normalize**: the raw filter is repaired into a well-formed
//!    predicate (`filter`) through bracket escaping, missing-connective
//!    insertion, quote de-nesting and whitespace collapse.
//! 4. **Query**: the filter is evaluated over the valid records of the
//!    shared registry (`query`), failing open to the full valid set when
//!    the expression cannot be parsed or evaluated.
//! 5. **Pack and send**: matches are rendered into the binary wire layout
//!    (`packet`), obfuscated with the keyed response cipher and written
//!    back.
//!
//! ## Module Organization
//!
//! - [`network`]: TCP accept loop and per-connection session lifecycle,
//!   timeouts and teardown.
//! - [`request`]: request token decoding.
//! - [`filter`]: best-effort repair of malformed filter expressions.
//! - [`query`]: filter parsing and evaluation against server records.
//! - [`packet`]: binary response packing.
//! - [`registry`]: the concurrently readable directory of registered
//!   servers; populated by the reporting side, read-only here.
//!
//! ## Error Philosophy
//!
//! Nothing on this path is allowed to take the process down. Protocol
//! violations are dropped without a reply, repair and evaluation failures
//! fall back to the last good state, unknown field names render as `"0"`,
//! and socket errors terminate only their own session.

pub mod filter;
pub mod network;
pub mod packet;
pub mod query;
pub mod registry;
pub mod request;
