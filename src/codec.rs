//! Token encoding strategies.
//!
//! Three interchangeable strategies share one contract: encode a (page,
//! state) pair into the token suffix, and resolve a submitted token back to
//! the recorded state. Decoding failures are expected adversarial input and
//! surface as [`DecodeError`], never as a panic.

use base64::Engine as _;

use crate::cipher::{self, CipherError};
use crate::config::{Config, Strategy};
use crate::error::EngineError;
use crate::state::{Page, PageId, State};
use crate::store::SessionState;
use crate::token::StateToken;

const BASE64: base64::engine::GeneralPurpose = base64::engine::general_purpose::URL_SAFE_NO_PAD;

/// Separator between payload and digest in hash-strategy suffixes.
const DIGEST_SEPARATOR: char = '.';

/// Why a token failed to resolve.
///
/// The two variants map onto the catalog codes `INVALID_PAGE_ID` and
/// `INVALID_HDIV_PARAMETER_VALUE`; both are client-attributable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The page id is unknown to the session (or malformed).
    UnknownPage,
    /// The token failed verification: nonce mismatch, bad ciphertext,
    /// bad digest, corrupt payload, or a state id that does not exist.
    Tampered,
}

impl From<CipherError> for DecodeError {
    fn from(_: CipherError) -> Self {
        DecodeError::Tampered
    }
}

/// One token encoding strategy.
///
/// `encode` runs on the write path while the composer holds the session
/// lock; `decode` runs on the read path and must deterministically either
/// recover the recorded state or reject. No strategy may silently resolve a
/// tampered token to a different valid state.
pub trait StateCodec: Send + Sync {
    /// Encodes a state into the full token string.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] only for server-side faults (serialization,
    /// encryption); never for anything client-controlled.
    fn encode(
        &self,
        page: &Page,
        state: &State,
        session: &mut SessionState,
    ) -> Result<String, EngineError>;

    /// Resolves a parsed token back to its recorded state.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] for any tampered, corrupt or unknown token.
    fn decode(&self, token: &StateToken, session: &mut SessionState)
        -> Result<State, DecodeError>;
}

/// Returns the codec for the configured strategy.
pub fn codec_for(config: &Config) -> Box<dyn StateCodec> {
    match config.strategy_kind() {
        Strategy::Reference => Box::new(ReferenceCodec),
        Strategy::Cipher => Box::new(CipherCodec {
            compress: config.compression_enabled(),
        }),
        Strategy::Hash => Box::new(HashCodec),
    }
}

/// Reference strategy: the suffix is the page's anti-replay nonce and the
/// state itself stays in server-side session memory.
///
/// Cheapest tokens, but every open page must remain resident; a page evicted
/// by the LRU bound (or re-rendered with a fresh nonce) invalidates its
/// tokens.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceCodec;

impl StateCodec for ReferenceCodec {
    fn encode(
        &self,
        page: &Page,
        state: &State,
        _session: &mut SessionState,
    ) -> Result<String, EngineError> {
        Ok(StateToken::new(page.page_id(), state.state_id(), page.random_token()).to_string())
    }

    fn decode(
        &self,
        token: &StateToken,
        session: &mut SessionState,
    ) -> Result<State, DecodeError> {
        let page = session.page(token.page_id()).ok_or(DecodeError::UnknownPage)?;
        // Nonce comparison is what invalidates tokens from a stale render.
        if page.random_token() != token.suffix() {
            return Err(DecodeError::Tampered);
        }
        page.state(token.state_id())
            .cloned()
            .ok_or(DecodeError::Tampered)
    }
}

/// Cipher strategy: the suffix is the page id and whole state, serialized,
/// optionally deflate-compressed, and sealed with the session's AEAD key.
///
/// Tokens are self-contained (no page lookup on decode) but still bound to
/// the session through its key.
#[derive(Debug, Clone, Copy)]
pub struct CipherCodec {
    /// Deflate the serialized state before sealing.
    pub compress: bool,
}

impl StateCodec for CipherCodec {
    fn encode(
        &self,
        page: &Page,
        state: &State,
        session: &mut SessionState,
    ) -> Result<String, EngineError> {
        let serialized = bincode::serialize(&(page.page_id(), state))
            .map_err(|e| EngineError::StateSerialization(e.to_string()))?;
        let payload = if self.compress {
            cipher::compress(&serialized)?
        } else {
            serialized
        };
        let sealed = session.key().encrypt(&payload)?;
        let suffix = BASE64.encode(sealed);
        Ok(StateToken::new(page.page_id(), state.state_id(), suffix).to_string())
    }

    fn decode(
        &self,
        token: &StateToken,
        session: &mut SessionState,
    ) -> Result<State, DecodeError> {
        let sealed = BASE64
            .decode(token.suffix())
            .map_err(|_| DecodeError::Tampered)?;
        let payload = session.key().decrypt(&sealed)?;
        let serialized = if self.compress {
            cipher::decompress(&payload)?
        } else {
            payload
        };
        let (page_id, state): (PageId, State) =
            bincode::deserialize(&serialized).map_err(|_| DecodeError::Tampered)?;
        // The ids embedded in the sealed payload must agree with the clear
        // token fields, or someone spliced or edited the id fields.
        if page_id != token.page_id() || state.state_id() != token.state_id() {
            return Err(DecodeError::Tampered);
        }
        Ok(state)
    }
}

/// Hash strategy: the suffix carries the serialized page id and state in
/// the clear plus a keyed digest over them.
///
/// Cheaper than the cipher strategy, but the client can read the recorded
/// values; combine with confidentiality mode when values must stay hidden.
#[derive(Debug, Clone, Copy)]
pub struct HashCodec;

impl StateCodec for HashCodec {
    fn encode(
        &self,
        page: &Page,
        state: &State,
        session: &mut SessionState,
    ) -> Result<String, EngineError> {
        let serialized = bincode::serialize(&(page.page_id(), state))
            .map_err(|e| EngineError::StateSerialization(e.to_string()))?;
        let digest = session.key().digest(&serialized);
        let suffix = format!(
            "{}{}{}",
            BASE64.encode(&serialized),
            DIGEST_SEPARATOR,
            BASE64.encode(digest)
        );
        Ok(StateToken::new(page.page_id(), state.state_id(), suffix).to_string())
    }

    fn decode(
        &self,
        token: &StateToken,
        session: &mut SessionState,
    ) -> Result<State, DecodeError> {
        let (payload_part, digest_part) = token
            .suffix()
            .split_once(DIGEST_SEPARATOR)
            .ok_or(DecodeError::Tampered)?;
        let serialized = BASE64
            .decode(payload_part)
            .map_err(|_| DecodeError::Tampered)?;
        let digest = BASE64
            .decode(digest_part)
            .map_err(|_| DecodeError::Tampered)?;
        session.key().verify_digest(&serialized, &digest)?;
        let (page_id, state): (PageId, State) =
            bincode::deserialize(&serialized).map_err(|_| DecodeError::Tampered)?;
        if page_id != token.page_id() || state.state_id() != token.state_id() {
            return Err(DecodeError::Tampered);
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Page, PageId};

    fn sample_page() -> (Page, State) {
        let mut page = Page::new(PageId::Seq(0));
        let mut state = State::new(page.next_state_id(), "/buy");
        state.add_value("qty", "1");
        state.add_value("qty", "2");
        state.require_parameter("qty");
        page.push_state(state.clone());
        (page, state)
    }

    fn round_trip(codec: &dyn StateCodec) {
        let mut session = SessionState::new(5);
        let (page, state) = sample_page();
        let encoded = codec.encode(&page, &state, &mut session).unwrap();
        session.commit_page(page);

        let token = StateToken::parse(&encoded).unwrap();
        let decoded = codec.decode(&token, &mut session).unwrap();

        assert_eq!(decoded, state);
    }

    #[test]
    fn reference_round_trip() {
        round_trip(&ReferenceCodec);
    }

    #[test]
    fn cipher_round_trip() {
        round_trip(&CipherCodec { compress: true });
        round_trip(&CipherCodec { compress: false });
    }

    #[test]
    fn hash_round_trip() {
        round_trip(&HashCodec);
    }

    #[test]
    fn reference_rejects_stale_nonce() {
        let codec = ReferenceCodec;
        let mut session = SessionState::new(5);
        let (page, state) = sample_page();
        let encoded = codec.encode(&page, &state, &mut session).unwrap();
        session.commit_page(page);

        // Re-render the page: fresh nonce, old token must die.
        let mut page = session.take_page(PageId::Seq(0)).unwrap();
        page.refresh_token();
        session.commit_page(page);

        let token = StateToken::parse(&encoded).unwrap();
        assert_eq!(
            codec.decode(&token, &mut session),
            Err(DecodeError::Tampered)
        );
    }

    #[test]
    fn reference_rejects_unknown_page() {
        let codec = ReferenceCodec;
        let mut session = SessionState::new(5);
        let token = StateToken::parse("9-0-deadbeef").unwrap();
        assert_eq!(
            codec.decode(&token, &mut session),
            Err(DecodeError::UnknownPage)
        );
    }

    #[test]
    fn cipher_rejects_other_sessions_tokens() {
        let codec = CipherCodec { compress: true };
        let mut session = SessionState::new(5);
        let (page, state) = sample_page();
        let encoded = codec.encode(&page, &state, &mut session).unwrap();

        let mut other = SessionState::new(5);
        let token = StateToken::parse(&encoded).unwrap();
        assert_eq!(codec.decode(&token, &mut other), Err(DecodeError::Tampered));
    }

    #[test]
    fn spliced_suffix_is_rejected() {
        // A valid suffix attached to a different state id must not resolve.
        let codec = HashCodec;
        let mut session = SessionState::new(5);
        let (page, state) = sample_page();
        let encoded = codec.encode(&page, &state, &mut session).unwrap();
        let token = StateToken::parse(&encoded).unwrap();

        let spliced = StateToken::parse(&format!(
            "{}-{}-{}",
            token.page_id(),
            token.state_id() + 1,
            token.suffix()
        ))
        .unwrap();
        assert_eq!(
            codec.decode(&spliced, &mut session),
            Err(DecodeError::Tampered)
        );
    }

    #[test]
    fn page_id_tamper_is_rejected_by_self_contained_codecs() {
        // Editing the clear page-id field must not resolve, even though
        // neither codec needs the page resident to decode.
        let cipher = CipherCodec { compress: true };
        let hash = HashCodec;
        for codec in [&cipher as &dyn StateCodec, &hash] {
            let mut session = SessionState::new(5);
            let (page, state) = sample_page();
            let encoded = codec.encode(&page, &state, &mut session).unwrap();
            let token = StateToken::parse(&encoded).unwrap();

            let moved = StateToken::parse(&format!(
                "7-{}-{}",
                token.state_id(),
                token.suffix()
            ))
            .unwrap();
            assert_eq!(
                codec.decode(&moved, &mut session),
                Err(DecodeError::Tampered)
            );
        }
    }

    #[test]
    fn hash_rejects_modified_payload() {
        let codec = HashCodec;
        let mut session = SessionState::new(5);
        let (page, state) = sample_page();
        let encoded = codec.encode(&page, &state, &mut session).unwrap();

        // Flip a character inside the clear payload, keep the digest.
        let token = StateToken::parse(&encoded).unwrap();
        let mut suffix = token.suffix().to_string();
        let flipped = if suffix.starts_with('A') { 'B' } else { 'A' };
        suffix.replace_range(0..1, &flipped.to_string());

        let tampered =
            StateToken::parse(&format!("{}-{}-{}", token.page_id(), token.state_id(), suffix))
                .unwrap();
        assert_eq!(
            codec.decode(&tampered, &mut session),
            Err(DecodeError::Tampered)
        );
    }

    #[test]
    fn codec_for_matches_strategy() {
        let reference = Config::new().strategy(Strategy::Reference);
        let cipher = Config::new().strategy(Strategy::Cipher);
        let hash = Config::new().strategy(Strategy::Hash);

        // Behavioral check: only the reference codec needs the page resident.
        let mut session = SessionState::new(5);
        let (page, state) = sample_page();
        let encoded = codec_for(&cipher)
            .encode(&page, &state, &mut session)
            .unwrap();
        let token = StateToken::parse(&encoded).unwrap();
        assert!(codec_for(&cipher).decode(&token, &mut session).is_ok());

        let _ = codec_for(&reference);
        let _ = codec_for(&hash);
    }
}
