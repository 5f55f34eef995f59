use crate::package::{Field, PitchPackage};
use crate::store::{KeyValueStore, PitchStore, StorageError};
use crate::validation::ValidationError;
use percent_encoding::percent_decode_str;
use rand::Rng;
use thiserror::Error;
use url::Url;

/// Length of a generated pitch reference
pub const REFERENCE_LEN: usize = 9;

const REFERENCE_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Query parameter names of a share link
pub const PORTFOLIO_PARAM: &str = "portfolio";
pub const LINKEDIN_PARAM: &str = "linkedin";
pub const PITCH_ID_PARAM: &str = "pitchId";
pub const LEGACY_PITCH_PARAM: &str = "pitch";

/// A share link could not be turned back into a package
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeFailure {
    #[error("link is missing required fields: {}", field_list(.0))]
    MissingFields(Vec<Field>),

    #[error("pitch {0} is not stored on this device")]
    UnresolvedReference(String),

    #[error("the {0} parameter is not valid URL encoding")]
    MalformedEncoding(Field),

    #[error("the {field} parameter is invalid: {source}")]
    Invalid {
        field: Field,
        source: ValidationError,
    },
}

fn field_list(fields: &[Field]) -> String {
    fields
        .iter()
        .map(Field::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result of sharing a package
#[derive(Debug)]
pub struct Encoded {
    /// Link to hand out (or render as a QR code)
    pub share_url: String,

    /// Opaque token the pitch text is stored under
    pub reference: String,

    /// Set when the pitch could not be persisted; the link will not resolve
    /// its pitch for anyone, but sharing still went ahead
    pub storage_warning: Option<StorageError>,
}

/// Encodes packages into short share links and decodes them back
#[derive(Debug)]
pub struct LinkCodec<S> {
    base_url: Url,
    store: PitchStore<S>,
    inline_pitch: bool,
}

impl<S: KeyValueStore> LinkCodec<S> {
    /// Links are built on top of `base_url`, the address the viewer is served from
    pub fn new(base_url: Url, store: PitchStore<S>) -> Self {
        Self {
            base_url,
            store,
            inline_pitch: false,
        }
    }

    /// Also embed the raw pitch so links resolve on devices without the store entry
    pub fn with_inline_pitch(mut self, inline_pitch: bool) -> Self {
        self.inline_pitch = inline_pitch;
        self
    }

    pub fn store(&self) -> &PitchStore<S> {
        &self.store
    }

    /// Stores the pitch under a fresh reference and builds the share link
    pub fn encode(&mut self, package: &PitchPackage) -> Encoded {
        let reference = self.fresh_reference();

        let storage_warning = match self.store.put(&reference, package.pitch_text()) {
            Ok(()) => None,
            Err(e) => {
                ::log::warn!(
                    "Could not store pitch {}: {}; the link may not work for others",
                    reference,
                    e
                );
                Some(e)
            }
        };

        let mut url = self.base_url.clone();
        url.set_query(None);
        url.set_fragment(None);
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair(PORTFOLIO_PARAM, package.portfolio_url())
                .append_pair(LINKEDIN_PARAM, package.linkedin_url())
                .append_pair(PITCH_ID_PARAM, &reference);
            if self.inline_pitch {
                pairs.append_pair(LEGACY_PITCH_PARAM, package.pitch_text());
            }
        }

        ::log::info!("Encoded share link with pitch reference {}", reference);
        Encoded {
            share_url: url.to_string(),
            reference,
            storage_warning,
        }
    }

    /// Decodes a full share link, or just its query string
    pub fn decode_link(&self, link: &str) -> Result<PitchPackage, DecodeFailure> {
        match Url::parse(link) {
            Ok(url) => self.decode(url.query().unwrap_or_default()),
            Err(_) => self.decode(link),
        }
    }

    /// Rebuilds a package from share link query parameters
    pub fn decode(&self, query: &str) -> Result<PitchPackage, DecodeFailure> {
        let params = QueryParams::parse(query);

        let portfolio = params.get(PORTFOLIO_PARAM);
        let linkedin = params.get(LINKEDIN_PARAM);
        let mut missing = Vec::new();
        if portfolio.is_none() {
            missing.push(Field::Portfolio);
        }
        if linkedin.is_none() {
            missing.push(Field::Linkedin);
        }
        let (Some(portfolio), Some(linkedin)) = (portfolio, linkedin) else {
            return Err(DecodeFailure::MissingFields(missing));
        };

        let portfolio =
            decode_strict(portfolio).ok_or(DecodeFailure::MalformedEncoding(Field::Portfolio))?;
        let linkedin =
            decode_strict(linkedin).ok_or(DecodeFailure::MalformedEncoding(Field::Linkedin))?;
        let pitch = self.resolve_pitch(&params)?;

        PitchPackage::new(&portfolio, &linkedin, &pitch).map_err(|mut problems| {
            let (field, source) = problems.remove(0);
            DecodeFailure::Invalid { field, source }
        })
    }

    /// Prefers the stored reference, falling back to the legacy inline pitch
    fn resolve_pitch(&self, params: &QueryParams<'_>) -> Result<String, DecodeFailure> {
        let legacy = params.get(LEGACY_PITCH_PARAM).map(decode_lossy);

        match params.get(PITCH_ID_PARAM) {
            Some(reference) => {
                let reference = decode_lossy(reference);
                if let Some(text) = self.store.get(&reference) {
                    return Ok(text);
                }
                match legacy {
                    Some(text) => {
                        ::log::debug!(
                            "Pitch {} not stored here, using inline pitch",
                            reference
                        );
                        Ok(text)
                    }
                    None => Err(DecodeFailure::UnresolvedReference(reference)),
                }
            }
            None => legacy.ok_or_else(|| DecodeFailure::MissingFields(vec![Field::Pitch])),
        }
    }

    fn fresh_reference(&self) -> String {
        let mut rng = rand::rng();
        loop {
            let reference: String = (0..REFERENCE_LEN)
                .map(|_| {
                    let idx = rng.random_range(0..REFERENCE_ALPHABET.len());
                    REFERENCE_ALPHABET[idx] as char
                })
                .collect();
            if !self.store.contains(&reference) {
                return reference;
            }
        }
    }
}

/// Raw (still encoded) query parameters; the first occurrence of a key wins
struct QueryParams<'a> {
    pairs: Vec<(String, &'a str)>,
}

impl<'a> QueryParams<'a> {
    fn parse(query: &'a str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let pairs = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                (decode_lossy(key), value)
            })
            .collect();
        Self { pairs }
    }

    /// Value of `key`, treating an empty value as absent
    fn get(&self, key: &str) -> Option<&'a str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| *v)
            .filter(|v| !v.is_empty())
    }
}

/// Decodes a form-encoded component, rejecting stray `%` and invalid UTF-8
fn decode_strict(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let escape = bytes.get(i + 1..i + 3)?;
            if !escape.iter().all(u8::is_ascii_hexdigit) {
                return None;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .ok()
        .map(|s| s.into_owned())
}

/// Decodes whatever it can, replacing invalid UTF-8
fn decode_lossy(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use proptest::prelude::*;

    fn codec() -> LinkCodec<MemoryStore> {
        LinkCodec::new(
            Url::parse("https://pitch.example/view").unwrap(),
            PitchStore::new(MemoryStore::new()),
        )
    }

    fn package() -> PitchPackage {
        PitchPackage::new(
            "https://jane.dev/work?tab=all",
            "https://linkedin.com/in/jane",
            "Hi! I'm Jane & I ship 100% of my side projects.",
        )
        .unwrap()
    }

    #[test]
    fn test_round_trip() {
        let mut codec = codec();
        let pkg = package();
        let encoded = codec.encode(&pkg);

        assert!(encoded.storage_warning.is_none());
        assert_eq!(encoded.reference.len(), REFERENCE_LEN);
        assert!(encoded.share_url.starts_with("https://pitch.example/view?"));
        assert_eq!(codec.decode_link(&encoded.share_url), Ok(pkg));
    }

    #[test]
    fn test_link_carries_reference_not_text() {
        let mut codec = codec();
        let encoded = codec.encode(&package());
        let url = Url::parse(&encoded.share_url).unwrap();
        let keys: Vec<String> = url.query_pairs().map(|(k, _)| k.into_owned()).collect();
        assert_eq!(keys, vec!["portfolio", "linkedin", "pitchId"]);
        assert!(!encoded.share_url.contains("Jane"));
    }

    #[test]
    fn test_missing_fields() {
        let codec = codec();
        assert_eq!(
            codec.decode("pitch=hello+world+again"),
            Err(DecodeFailure::MissingFields(vec![
                Field::Portfolio,
                Field::Linkedin
            ]))
        );
        assert_eq!(
            codec.decode("portfolio=https%3A%2F%2Fjane.dev&linkedin="),
            Err(DecodeFailure::MissingFields(vec![Field::Linkedin]))
        );
        assert_eq!(
            codec.decode(
                "?portfolio=https%3A%2F%2Fjane.dev&linkedin=https%3A%2F%2Flinkedin.com%2Fin%2Fjane"
            ),
            Err(DecodeFailure::MissingFields(vec![Field::Pitch]))
        );
    }

    #[test]
    fn test_unresolved_reference() {
        let codec = codec();
        let query = "portfolio=https%3A%2F%2Fjane.dev&linkedin=https%3A%2F%2Flinkedin.com%2Fin%2Fjane&pitchId=gone12345";
        assert_eq!(
            codec.decode(query),
            Err(DecodeFailure::UnresolvedReference("gone12345".to_string()))
        );
    }

    #[test]
    fn test_unresolved_reference_falls_back_to_inline_pitch() {
        let mut sender = codec().with_inline_pitch(true);
        let pkg = package();
        let encoded = sender.encode(&pkg);

        // Another device: empty store
        let receiver = codec();
        assert_eq!(receiver.decode_link(&encoded.share_url), Ok(pkg));
    }

    #[test]
    fn test_legacy_inline_pitch_only() {
        let codec = codec();
        let query = "portfolio=https%3A%2F%2Fjane.dev&linkedin=https%3A%2F%2Flinkedin.com%2Fin%2Fjane&pitch=Caf%C3%A9+owner+turned+engineer";
        let pkg = codec.decode(query).unwrap();
        assert_eq!(pkg.pitch_text(), "Café owner turned engineer");
    }

    #[test]
    fn test_legacy_pitch_degrades_bad_bytes() {
        let codec = codec();
        let query = "portfolio=https%3A%2F%2Fjane.dev&linkedin=https%3A%2F%2Flinkedin.com%2Fin%2Fjane&pitch=Builder+of+things+%FF%FE";
        let pkg = codec.decode(query).unwrap();
        assert!(pkg.pitch_text().starts_with("Builder of things"));
    }

    #[test]
    fn test_malformed_encoding() {
        let codec = codec();
        assert_eq!(
            codec.decode("portfolio=https%3A%2F%2Fjane.dev%zz&linkedin=x&pitch=long+enough+pitch"),
            Err(DecodeFailure::MalformedEncoding(Field::Portfolio))
        );
        assert_eq!(
            codec.decode("portfolio=https%3A%2F%2Fjane.dev&linkedin=%C3%28&pitch=long+enough+pitch"),
            Err(DecodeFailure::MalformedEncoding(Field::Linkedin))
        );
    }

    #[test]
    fn test_decoded_urls_are_revalidated() {
        let codec = codec();
        let query = "portfolio=javascript%3Aalert(1)&linkedin=https%3A%2F%2Flinkedin.com%2Fin%2Fjane&pitch=long+enough+pitch";
        assert_eq!(
            codec.decode(query),
            Err(DecodeFailure::Invalid {
                field: Field::Portfolio,
                source: ValidationError::Scheme,
            })
        );
    }

    #[test]
    fn test_storage_failure_still_produces_link() {
        let mut codec = LinkCodec::new(
            Url::parse("https://pitch.example/").unwrap(),
            PitchStore::new(MemoryStore::with_quota(8)),
        );
        let encoded = codec.encode(&package());
        assert!(matches!(
            encoded.storage_warning,
            Some(StorageError::QuotaExceeded { .. })
        ));
        assert_eq!(
            codec.decode_link(&encoded.share_url),
            Err(DecodeFailure::UnresolvedReference(encoded.reference))
        );
    }

    #[test]
    fn test_eleventh_share_evicts_first_link() {
        let mut codec = codec();
        let pkg = package();
        let links: Vec<Encoded> = (0..11).map(|_| codec.encode(&pkg)).collect();

        assert!(matches!(
            codec.decode_link(&links[0].share_url),
            Err(DecodeFailure::UnresolvedReference(_))
        ));
        for link in &links[1..] {
            assert_eq!(codec.decode_link(&link.share_url), Ok(pkg.clone()));
        }
    }

    proptest! {
        #[test]
        fn prop_encode_decode_round_trip(
            host in "[a-z][a-z0-9]{0,12}\\.(com|io|dev|design)",
            path in "(/[a-zA-Z0-9_.~-]{1,8}){0,3}",
            profile in "[a-z0-9-]{1,24}",
            www in any::<bool>(),
            pitch in "[A-Za-z0-9 ,.!?'&=+%#/éü]{10,120}",
        ) {
            prop_assume!(pitch.trim().chars().count() >= 10);

            let portfolio = format!("https://{host}{path}");
            let linkedin = format!(
                "https://{}linkedin.com/in/{profile}",
                if www { "www." } else { "" }
            );
            let pkg = PitchPackage::new(&portfolio, &linkedin, &pitch).unwrap();

            let mut codec = codec();
            let encoded = codec.encode(&pkg);
            prop_assert_eq!(codec.decode_link(&encoded.share_url), Ok(pkg));
        }
    }
}
