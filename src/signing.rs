//! SHA-256 / HMAC-SHA256 primitives and canonical-request signing.
//!
//! The signer builds the four-part canonical request the Volcengine visual
//! API verifies (a SigV4-style scheme with its own algorithm name and a
//! `request` scope terminator). A single byte of difference in any
//! canonical string produces a different signature and the API answers
//! 401, so every separator below is significant.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Algorithm name placed in the string to sign and the Authorization header.
pub const ALGORITHM: &str = "HMAC-SHA256";

/// Signed headers, lowercase, in canonical order.
pub const SIGNED_HEADERS: &str = "content-type;host;x-content-sha256;x-date";

const CONTENT_TYPE: &str = "application/json";
const SCOPE_TERMINATOR: &str = "request";

/// Hex-encoded SHA-256 digest of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Raw HMAC-SHA256 of `message` under `key`.
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length, so construction cannot fail.
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC key of any size");
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

/// The inputs that vary per request.
#[derive(Debug, Clone)]
pub struct SigningRequest<'a> {
    /// Public half of the credential.
    pub access_key_id: &'a str,
    /// Secret half of the credential.
    pub secret_access_key: &'a str,
    /// HTTP method, uppercase.
    pub method: &'a str,
    /// Host header value.
    pub host: &'a str,
    /// Request path, e.g. `/`.
    pub path: &'a str,
    /// Query parameters in any order.
    pub query: &'a [(&'a str, &'a str)],
    /// Exact body bytes that will be sent.
    pub body: &'a str,
}

/// Headers produced by [`CanonicalSigner::sign`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    /// `Authorization` header value.
    pub authorization: String,
    /// `X-Date` header value (`YYYYMMDD'T'HHMMSS'Z'`).
    pub x_date: String,
    /// `X-Content-Sha256` header value.
    pub x_content_sha256: String,
}

/// Signs requests for one fixed region/service pair.
#[derive(Debug, Clone, Copy)]
pub struct CanonicalSigner {
    region: &'static str,
    service: &'static str,
}

impl CanonicalSigner {
    /// Creates a signer bound to `region` and `service`.
    pub const fn new(region: &'static str, service: &'static str) -> Self {
        Self { region, service }
    }

    /// Returns the region this signer signs for.
    pub fn region(&self) -> &'static str {
        self.region
    }

    /// Returns the service this signer signs for.
    pub fn service(&self) -> &'static str {
        self.service
    }

    /// Signs `request` as of `now`.
    pub fn sign(&self, request: &SigningRequest<'_>, now: DateTime<Utc>) -> SignedHeaders {
        let timestamp = now.format("%Y%m%dT%H%M%SZ").to_string();
        let short_date = now.format("%Y%m%d").to_string();

        let content_hash = sha256_hex(request.body.as_bytes());
        let canonical = canonical_request(request, &timestamp, &content_hash);
        let scope = self.credential_scope(&short_date);

        let string_to_sign = [
            ALGORITHM,
            timestamp.as_str(),
            scope.as_str(),
            sha256_hex(canonical.as_bytes()).as_str(),
        ]
        .join("\n");

        let key = self.signing_key(request.secret_access_key, &short_date);
        let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));

        SignedHeaders {
            authorization: format!(
                "{ALGORITHM} Credential={}/{scope}, SignedHeaders={SIGNED_HEADERS}, Signature={signature}",
                request.access_key_id
            ),
            x_date: timestamp,
            x_content_sha256: content_hash,
        }
    }

    /// `shortDate/region/service/request`.
    pub fn credential_scope(&self, short_date: &str) -> String {
        format!(
            "{short_date}/{}/{}/{SCOPE_TERMINATOR}",
            self.region, self.service
        )
    }

    /// Derives the signing key through the date → region → service →
    /// `request` HMAC chain.
    pub fn signing_key(&self, secret_access_key: &str, short_date: &str) -> Vec<u8> {
        let k_date = hmac_sha256(secret_access_key.as_bytes(), short_date.as_bytes());
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, self.service.as_bytes());
        hmac_sha256(&k_service, SCOPE_TERMINATOR.as_bytes())
    }
}

/// Query parameters sorted by key, URL-encoded, joined with `&`.
pub fn canonical_query(params: &[(&str, &str)]) -> String {
    let mut sorted = params.to_vec();
    sorted.sort();
    sorted
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Canonical header block with its trailing newline.
pub fn canonical_headers(host: &str, content_hash: &str, timestamp: &str) -> String {
    format!(
        "content-type:{CONTENT_TYPE}\nhost:{host}\nx-content-sha256:{content_hash}\nx-date:{timestamp}\n"
    )
}

/// `METHOD\nPATH\nQUERY\nHEADERS\nSIGNED_HEADERS\nCONTENT_HASH`.
pub fn canonical_request(
    request: &SigningRequest<'_>,
    timestamp: &str,
    content_hash: &str,
) -> String {
    [
        request.method,
        request.path,
        canonical_query(request.query).as_str(),
        canonical_headers(request.host, content_hash, timestamp).as_str(),
        SIGNED_HEADERS,
        content_hash,
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const BODY: &str = r#"{"prompt":"a red fox"}"#;
    const BODY_HASH: &str = "8580d60439313925558e1bf13b3d4e10d1a83fba4b563907321c32680ace1dca";

    fn fixture() -> SigningRequest<'static> {
        SigningRequest {
            access_key_id: "AKLTexampleAccessKey",
            secret_access_key: "exampleSecretKey==",
            method: "POST",
            host: "visual.volcengineapi.com",
            path: "/",
            query: &[("Version", "2022-08-31"), ("Action", "CVProcess")],
            body: BODY,
        }
    }

    fn frozen_clock() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap()
    }

    #[test]
    fn test_sha256_of_empty_string() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hmac_known_vector() {
        let mac = hmac_sha256(b"key", b"The quick brown fox jumps over the lazy dog");
        assert_eq!(
            hex::encode(mac),
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn test_canonical_query_sorted() {
        let query = canonical_query(&[("Version", "2022-08-31"), ("Action", "CVProcess")]);
        assert_eq!(query, "Action=CVProcess&Version=2022-08-31");
    }

    #[test]
    fn test_canonical_query_encodes_values() {
        let query = canonical_query(&[("b", "x y"), ("a", "1/2")]);
        assert_eq!(query, "a=1%2F2&b=x%20y");
    }

    #[test]
    fn test_canonical_request_layout() {
        let canonical = canonical_request(&fixture(), "20250314T092653Z", BODY_HASH);
        let expected = format!(
            "POST\n/\nAction=CVProcess&Version=2022-08-31\n\
             content-type:application/json\nhost:visual.volcengineapi.com\n\
             x-content-sha256:{BODY_HASH}\nx-date:20250314T092653Z\n\n\
             content-type;host;x-content-sha256;x-date\n{BODY_HASH}"
        );
        assert_eq!(canonical, expected);
        assert_eq!(
            sha256_hex(canonical.as_bytes()),
            "63a16c11079698b0f93f76fbd84713b3c6ca7e7cc7ab2267ce68cc5a271aed40"
        );
    }

    #[test]
    fn test_sign_matches_fixture() {
        let signer = CanonicalSigner::new("cn-north-1", "cv");
        let headers = signer.sign(&fixture(), frozen_clock());

        assert_eq!(headers.x_date, "20250314T092653Z");
        assert_eq!(headers.x_content_sha256, BODY_HASH);
        assert_eq!(
            headers.authorization,
            "HMAC-SHA256 Credential=AKLTexampleAccessKey/20250314/cn-north-1/cv/request, \
             SignedHeaders=content-type;host;x-content-sha256;x-date, \
             Signature=9dcdfeb2c7ee5b9533a9fb23bd5553ee31a50c4f39a697010d5fc90d4afe7050"
        );
    }

    #[test]
    fn test_sign_is_deterministic() {
        let signer = CanonicalSigner::new("cn-north-1", "cv");
        let first = signer.sign(&fixture(), frozen_clock());
        let second = signer.sign(&fixture(), frozen_clock());
        assert_eq!(first, second);
    }

    #[test]
    fn test_signature_depends_on_region() {
        let a = CanonicalSigner::new("cn-north-1", "cv").sign(&fixture(), frozen_clock());
        let b = CanonicalSigner::new("cn-beijing", "cv").sign(&fixture(), frozen_clock());
        assert_ne!(a.authorization, b.authorization);
    }

    #[test]
    fn test_credential_scope() {
        let signer = CanonicalSigner::new("cn-north-1", "cv");
        assert_eq!(
            signer.credential_scope("20250314"),
            "20250314/cn-north-1/cv/request"
        );
    }
}
