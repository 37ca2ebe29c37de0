//! WBI request signing for Bilibili web APIs.
//!
//! A signed request carries two extra query parameters:
//! - `wts`: the current Unix time in seconds
//! - `w_rid`: `md5(urlencode(sorted(params + wts)) + mixin_key)` as lowercase hex
//!
//! The mixin key is a fixed 64-character scramble of the platform secret.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use url::form_urlencoded;

use crate::error::{StatsError, StatsResult};

/// Built-in platform secret the mixin key is derived from.
pub const WBI_KEY: &str = "560c52ccd288fed22173431c70775f83b407c0dfe424485a8e41741f14a3b87e";

/// Query key holding the signing timestamp.
pub const WTS_KEY: &str = "wts";

/// Query key holding the digest.
pub const W_RID_KEY: &str = "w_rid";

/// Length of the derived mixin key.
pub const MIXIN_KEY_LEN: usize = 64;

/// Index positions picked from the secret, in output order.
const MIXIN_KEY_ENC_TAB: [usize; MIXIN_KEY_LEN] = [
    46, 47, 18, 2, 53, 8, 23, 32, 15, 50, 10, 31, 58, 3, 45, 35, 27, 43, 5, 49, 33, 9, 42, 19, 29,
    28, 14, 39, 12, 38, 41, 13, 37, 48, 7, 16, 24, 55, 40, 61, 26, 17, 0, 1, 60, 51, 30, 4, 22, 25,
    54, 21, 56, 59, 6, 63, 57, 62, 11, 36, 20, 34, 44, 52,
];

/// String-keyed query parameters. Ordered by key, so iteration is already the
/// case-sensitive lexicographic order the digest expects.
pub type RequestParams = BTreeMap<String, String>;

/// Derive the mixin key from a secret.
///
/// Returns `None` if the secret is shorter than 64 characters.
pub fn mixin_key(secret: &str) -> Option<String> {
    let chars: Vec<char> = secret.chars().collect();
    MIXIN_KEY_ENC_TAB
        .iter()
        .map(|&i| chars.get(i).copied())
        .collect()
}

/// `key=value&key=value` form encoding, in iteration order.
pub fn encode_query<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// A freshly computed signature together with the exact parameters it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WbiSignature {
    pub wts: i64,
    pub w_rid: String,
    params: RequestParams,
}

impl WbiSignature {
    /// The signed parameters, `wts` included.
    pub fn params(&self) -> &RequestParams {
        &self.params
    }

    /// The query string to put on the wire: signed params followed by `w_rid`.
    pub fn query_string(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        serializer.extend_pairs(&self.params);
        serializer.append_pair(W_RID_KEY, &self.w_rid);
        serializer.finish()
    }
}

/// Signs parameter sets with a mixin key derived once at construction.
#[derive(Debug, Clone)]
pub struct WbiSigner {
    mixin_key: String,
}

impl Default for WbiSigner {
    fn default() -> Self {
        Self {
            mixin_key: mixin_key(WBI_KEY).unwrap_or_default(),
        }
    }
}

impl WbiSigner {
    pub fn new(secret: &str) -> StatsResult<Self> {
        let mixin_key = mixin_key(secret).ok_or_else(|| {
            StatsError::validation(format!(
                "WBI secret must be at least {} characters",
                MIXIN_KEY_LEN
            ))
        })?;
        Ok(Self { mixin_key })
    }

    pub fn mixin_key(&self) -> &str {
        &self.mixin_key
    }

    /// Sign `params` with the current time.
    pub fn sign(&self, params: RequestParams) -> WbiSignature {
        self.sign_at(params, unix_now())
    }

    /// Sign `params` as of `wts`. A caller-supplied `wts` entry is replaced.
    pub fn sign_at(&self, mut params: RequestParams, wts: i64) -> WbiSignature {
        if let Some(previous) = params.insert(WTS_KEY.to_string(), wts.to_string()) {
            tracing::warn!(previous = %previous, "caller supplied reserved `wts` param, overwriting");
        }

        let query = encode_query(&params);
        let w_rid = format!("{:x}", md5::compute(format!("{}{}", query, self.mixin_key)));

        WbiSignature { wts, w_rid, params }
    }
}
