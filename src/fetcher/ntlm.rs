//! NTLM message exchange for the `Authorization` header
//!
//! The handshake is three messages on one connection: the client sends a
//! NEGOTIATE, the server answers 401 with a CHALLENGE in `WWW-Authenticate`,
//! and the client repeats the request with an AUTHENTICATE computed from the
//! challenge (NTLMv2).

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::header::{HeaderMap, WWW_AUTHENTICATE};

use super::{Credentials, FetchError, FetchResult};

const SCHEME: &str = "NTLM";
const WORKSTATION: &str = "REPORT-DOWNLOADER";

fn auth_error(message: impl Into<String>) -> FetchError {
    FetchError::Auth {
        status: 401,
        message: message.into(),
    }
}

/// Split `DOMAIN\user` or `user@domain` into (domain, user)
pub fn split_domain(username: &str) -> (&str, &str) {
    if let Some((domain, user)) = username.split_once('\\') {
        (domain, user)
    } else if let Some((user, domain)) = username.rsplit_once('@') {
        (domain, user)
    } else {
        ("", username)
    }
}

/// `NTLM <base64 NEGOTIATE>`
pub fn negotiate_header() -> FetchResult<String> {
    let flags = ntlmclient::Flags::NEGOTIATE_UNICODE
        | ntlmclient::Flags::REQUEST_TARGET
        | ntlmclient::Flags::NEGOTIATE_NTLM
        | ntlmclient::Flags::NEGOTIATE_WORKSTATION_SUPPLIED;
    let message = ntlmclient::Message::Negotiate(ntlmclient::NegotiateMessage {
        flags,
        supplied_domain: String::new(),
        supplied_workstation: WORKSTATION.to_string(),
        os_version: Default::default(),
    });
    let bytes = message
        .to_bytes()
        .map_err(|e| FetchError::Internal(format!("cannot encode NTLM negotiate: {e:?}")))?;
    Ok(format!("{SCHEME} {}", STANDARD.encode(bytes)))
}

/// Raw CHALLENGE bytes from the first `WWW-Authenticate: NTLM <token>` header
pub fn challenge_from(headers: &HeaderMap) -> Option<Vec<u8>> {
    headers
        .get_all(WWW_AUTHENTICATE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.trim().split_once(' '))
        .find(|(scheme, _)| scheme.eq_ignore_ascii_case(SCHEME))
        .and_then(|(_, token)| STANDARD.decode(token.trim()).ok())
}

/// `NTLM <base64 AUTHENTICATE>` answering `challenge`
pub fn authenticate_header(challenge: &[u8], credentials: &Credentials) -> FetchResult<String> {
    let message = ntlmclient::Message::try_from(challenge)
        .map_err(|e| auth_error(format!("malformed NTLM challenge: {e:?}")))?;
    let ntlmclient::Message::Challenge(challenge) = message else {
        return Err(auth_error("server sent a non-challenge NTLM message"));
    };

    let target_info: Vec<u8> = challenge
        .target_information
        .iter()
        .flat_map(|entry| entry.to_bytes())
        .collect();
    let (domain, user) = split_domain(credentials.username());
    let creds = ntlmclient::Credentials {
        username: user.to_string(),
        password: credentials.secret().to_string(),
        domain: domain.to_string(),
    };

    let response = ntlmclient::respond_challenge_ntlm_v2(
        challenge.challenge,
        &target_info,
        ntlmclient::get_ntlm_time(),
        &creds,
    );
    let flags = ntlmclient::Flags::NEGOTIATE_UNICODE | ntlmclient::Flags::NEGOTIATE_NTLM;
    let bytes = response
        .to_message(&creds, WORKSTATION, flags)
        .to_bytes()
        .map_err(|e| FetchError::Internal(format!("cannot encode NTLM authenticate: {e:?}")))?;
    Ok(format!("{SCHEME} {}", STANDARD.encode(bytes)))
}
