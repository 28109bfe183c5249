//! Handing a host's identity to someone who wants to join.
//!
//! An invite is either the bare identity string or a link carrying it in
//! the `join` query parameter.

use url::Url;

use crate::error::NetworkError;
use crate::peer::PeerId;

/// Query parameter holding the host identity in an invite link.
pub const INVITE_QUERY_PARAM: &str = "join";

pub struct Invite;

impl Invite {
    /// The shareable code for `peer`.
    pub fn code(peer: &PeerId) -> String {
        peer.to_string()
    }

    /// An invite link rooted at `base_url`. Existing query parameters are
    /// kept; an existing `join` parameter is replaced.
    pub fn link(base_url: &str, peer: &PeerId) -> Result<String, NetworkError> {
        let mut url = Url::parse(base_url)
            .map_err(|e| NetworkError::InvalidInvite(format!("bad base url {}: {}", base_url, e)))?;
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != INVITE_QUERY_PARAM)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair(INVITE_QUERY_PARAM, peer.as_str());
        Ok(url.into())
    }

    /// Extract the host identity from a code or a link.
    pub fn parse(input: &str) -> Result<PeerId, NetworkError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(NetworkError::InvalidInvite("empty invite".into()));
        }

        if let Ok(url) = Url::parse(input) {
            if let Some((_, peer)) = url.query_pairs().find(|(k, _)| k == INVITE_QUERY_PARAM) {
                let peer = peer.trim();
                if peer.is_empty() {
                    return Err(NetworkError::InvalidInvite("empty join parameter".into()));
                }
                return Ok(PeerId::new(peer));
            }
            if url.has_host() {
                return Err(NetworkError::InvalidInvite(format!(
                    "link has no {} parameter",
                    INVITE_QUERY_PARAM
                )));
            }
        }

        Ok(PeerId::new(input))
    }
}
