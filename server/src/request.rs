//! Decoding of raw browse requests into their parts.
//!
//! A request is a run of NUL-separated ASCII tokens. The interesting ones:
//! token 2 is the game name, token 4 is the 8-character validation token
//! with the raw filter expression glued on behind it, token 5 is the
//! backslash-joined list of fields the client wants back.
//!
//! Anything malformed is rejected by returning `None`; the protocol has no
//! error-response form, so the session just keeps listening.

use log::debug;
use shared::{GAME_NAME, VALIDATE_LENGTH};

/// A decoded browse request, valid for the lifetime of one receive event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    /// Opaque 8-character token, passed through to the response cipher.
    pub validate: String,
    /// Raw filter expression; empty when the client sent none.
    pub filter: String,
    /// Requested field names, in the order they must be packed.
    pub fields: Vec<String>,
}

/// Parses one receive event's worth of bytes as a complete request.
///
/// Requests split across receive events are not reassembled; each event
/// must carry the whole token run or it is dropped.
pub fn parse_request(message: &str) -> Option<ParsedRequest> {
    // Example (from a live client):
    // \x01\x12\0\x01\x03\x01\0\0\0whamdowfr\0whamdowfr\0.Ts,PRe`(groupid is null)\0\\hostname\\mapname\\numplayers\0\0\0\0\x04
    let tokens: Vec<&str> = message.split('\x00').filter(|t| !t.is_empty()).collect();

    if tokens.len() < 6 {
        debug!("Dropping request with {} tokens", tokens.len());
        return None;
    }

    if !tokens[2].eq_ignore_ascii_case(GAME_NAME) {
        debug!("Dropping request for unknown game {:?}", tokens[2]);
        return None;
    }

    let combined = tokens[4];
    // Split on the character count, not the byte count; lossily decoded
    // bytes may not land on a byte boundary at 8.
    let (validate, filter) = match combined.char_indices().nth(VALIDATE_LENGTH) {
        Some((at, _)) => combined.split_at(at),
        None => (combined, ""),
    };

    let fields: Vec<String> = tokens[5]
        .split('\\')
        .filter(|f| !f.is_empty())
        .map(|f| f.to_string())
        .collect();

    Some(ParsedRequest {
        validate: validate.to_string(),
        filter: filter.to_string(),
        fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_request(game: &str, validate_and_filter: &str, fields: &str) -> String {
        [
            "\x01\x12",
            "\x03",
            game,
            "whamdowfr",
            validate_and_filter,
            fields,
            "\x04",
        ]
        .join("\x00")
    }

    #[test]
    fn parses_well_formed_request() {
        let message = build_request(
            "whamdowfr",
            "fkT>_2Crnumplayers > 0",
            "\\hostname\\mapname\\numplayers",
        );

        let request = parse_request(&message).expect("request should parse");
        assert_eq!(request.validate, "fkT>_2Cr");
        assert_eq!(request.filter, "numplayers > 0");
        assert_eq!(request.fields, vec!["hostname", "mapname", "numplayers"]);
    }

    #[test]
    fn validation_token_without_filter() {
        let message = build_request("whamdowfr", "fkT>_2Cr", "\\hostname");

        let request = parse_request(&message).unwrap();
        assert_eq!(request.validate, "fkT>_2Cr");
        assert_eq!(request.filter, "");
    }

    #[test]
    fn short_validation_token_is_kept_whole() {
        let message = build_request("whamdowfr", "abc", "\\hostname");

        let request = parse_request(&message).unwrap();
        assert_eq!(request.validate, "abc");
        assert_eq!(request.filter, "");
    }

    #[test]
    fn game_name_match_is_case_insensitive() {
        let message = build_request("WhamDowFr", "fkT>_2Cr", "\\hostname");
        assert!(parse_request(&message).is_some());
    }

    #[test]
    fn wrong_game_is_rejected() {
        let message = build_request("battlefield2", "fkT>_2Cr", "\\hostname");
        assert!(parse_request(&message).is_none());
    }

    #[test]
    fn too_few_tokens_is_rejected() {
        assert!(parse_request("").is_none());
        assert!(parse_request("\x00\x00\x00").is_none());
        assert!(parse_request("a\x00b\x00whamdowfr\x00c").is_none());
    }

    #[test]
    fn empty_tokens_are_discarded_before_indexing() {
        // Leading and doubled NULs must not shift the game name off index 2.
        let message = "\x00\x00a\x00b\x00whamdowfr\x00c\x00fkT>_2Cr\x00\\hostname\x00\x00tail";
        let request = parse_request(message).unwrap();
        assert_eq!(request.fields, vec!["hostname"]);
    }

    #[test]
    fn empty_field_segments_are_discarded() {
        let message = build_request("whamdowfr", "fkT>_2Cr", "\\\\hostname\\\\\\gametype\\");
        let request = parse_request(&message).unwrap();
        assert_eq!(request.fields, vec!["hostname", "gametype"]);
    }

    #[test]
    fn observed_live_request_parses() {
        let message = "\x01\x12\x00\x01\x03\x01\x00\x00\x00whamdowfr\x00whamdowfr\
                       \x00.Ts,PRe`(groupid is null) AND (groupid > 0)\
                       \x00\\hostname\\gamemode\\hostname\\hostport\\mapname\\password\
                       \\gamever\\numplayers\\maxplayers\x00\x00\x00\x00\x04";

        let request = parse_request(message).unwrap();
        assert_eq!(request.validate, ".Ts,PRe`");
        assert_eq!(request.filter, "(groupid is null) AND (groupid > 0)");
        assert_eq!(request.fields.len(), 9);
        assert_eq!(request.fields[0], "hostname");
        assert_eq!(request.fields[8], "maxplayers");
    }
}
