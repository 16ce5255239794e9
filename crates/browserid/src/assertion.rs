//! Backed Assertion Framing
//!
//! The wire form is `"~" seg1 "~" seg2 ... "~" segN`: the leading `~` is
//! mandatory, the final segment is the assertion (authenticator), earlier
//! segments are certificates ordered root-first. A reauthentication
//! assertion carries zero certificates.
//!
//! Audience packing for GSS-mode contexts wraps the service name as
//! `urn:x-gss:<spn>` with an optional `#<base64url(channel bindings)>`
//! suffix; plain-mode audiences pass through untouched.

// Layer 3: Internal module imports
use crate::codec;
use crate::error::{BidError, BidResult};
use crate::jose::jwt::Jwt;

/// Audience URN prefix for GSS-mode contexts.
pub const GSS_AUDIENCE_PREFIX: &str = "urn:x-gss:";

/// A parsed backed assertion.
#[derive(Debug, Clone)]
pub struct BackedAssertion {
    /// Certificates, root first, leaf last. Empty on the reauth path.
    pub certificates: Vec<Jwt>,

    /// The final authenticator JWT
    pub assertion: Jwt,

    /// The raw encoded form, hashed for the replay cache
    pub encoded: String,
}

impl BackedAssertion {
    /// Split and parse an encoded backed assertion.
    pub fn unpack(encoded: &str, max_certs: usize) -> BidResult<Self> {
        let rest = encoded
            .strip_prefix('~')
            .ok_or(BidError::InvalidAssertion)?;
        if rest.is_empty() {
            return Err(BidError::InvalidAssertion);
        }

        let mut segments: Vec<&str> = rest.split('~').collect();
        let assertion_segment = segments.pop().ok_or(BidError::InvalidAssertion)?;
        if segments.len() > max_certs {
            return Err(BidError::TooManyCerts);
        }

        let certificates = segments
            .iter()
            .map(|segment| Jwt::parse(segment))
            .collect::<BidResult<Vec<Jwt>>>()?;
        let assertion = Jwt::parse(assertion_segment)?;

        Ok(Self {
            certificates,
            assertion,
            encoded: encoded.to_string(),
        })
    }

    /// Serialize certificates and assertion back to the wire form.
    pub fn pack(certificates: &[Jwt], assertion: &Jwt) -> String {
        let mut packed = String::new();
        for certificate in certificates {
            packed.push('~');
            packed.push_str(&certificate.encoded);
        }
        packed.push('~');
        packed.push_str(&assertion.encoded);
        packed
    }

    /// The leaf certificate's payload (the one whose subject key signs the
    /// assertion), when any certificate is present.
    pub fn leaf_cert(&self) -> Option<&Jwt> {
        self.certificates.last()
    }

    /// The root certificate's payload (the one signed by the authority),
    /// when any certificate is present.
    pub fn root_cert(&self) -> Option<&Jwt> {
        self.certificates.first()
    }
}

/// Pack an audience with optional channel bindings.
///
/// Plain mode rejects channel bindings (they have no representation);
/// GSS mode produces the `urn:x-gss:` form.
pub fn pack_audience(
    audience: &str,
    channel_bindings: Option<&[u8]>,
    gss: bool,
) -> BidResult<String> {
    if !gss {
        if channel_bindings.is_some() {
            return Err(BidError::InvalidParameter(
                "channel bindings need a GSS audience",
            ));
        }
        return Ok(audience.to_string());
    }

    let mut packed = format!("{GSS_AUDIENCE_PREFIX}{audience}");
    if let Some(bindings) = channel_bindings {
        packed.push('#');
        packed.push_str(&codec::base64url_encode(bindings));
    }
    Ok(packed)
}

/// Unpack a packed audience into the service name and channel bindings.
pub fn unpack_audience(packed: &str, gss: bool) -> BidResult<(String, Option<Vec<u8>>)> {
    if !gss {
        return Ok((packed.to_string(), None));
    }

    let rest = packed
        .strip_prefix(GSS_AUDIENCE_PREFIX)
        .filter(|rest| !rest.is_empty())
        .ok_or(BidError::InvalidParameter("malformed audience URN"))?;

    match rest.rsplit_once('#') {
        Some((spn, suffix)) if !suffix.is_empty() => {
            Ok((spn.to_string(), Some(codec::base64url_decode(suffix)?)))
        }
        Some((spn, _)) => Ok((spn.to_string(), None)),
        None => Ok((rest.to_string(), None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jose::alg::SignatureAlgorithm;
    use crate::jose::jwk::Jwk;
    use serde_json::json;

    fn signed(payload: serde_json::Value) -> Jwt {
        let key = Jwk::from_value(json!({
            "algorithm": "HS",
            "secret-key": codec::base64url_encode(b"framing test key framing test key"),
        }))
        .unwrap();
        Jwt::sign(payload, SignatureAlgorithm::Hs256, &key).unwrap()
    }

    #[test]
    fn test_pack_unpack_round_trip() {
        let cert = signed(json!({"iss": "example.org"}));
        let assertion = signed(json!({"aud": "https://rp.example.com"}));

        let packed = BackedAssertion::pack(std::slice::from_ref(&cert), &assertion);
        assert!(packed.starts_with('~'));

        let unpacked = BackedAssertion::unpack(&packed, 6).unwrap();
        assert_eq!(unpacked.certificates.len(), 1);
        assert_eq!(unpacked.assertion.encoded, assertion.encoded);
        assert_eq!(unpacked.encoded, packed);
    }

    #[test]
    fn test_unpack_reauth_form_has_no_certs() {
        let authenticator = signed(json!({"tkt": "abc"}));
        let packed = BackedAssertion::pack(&[], &authenticator);

        let unpacked = BackedAssertion::unpack(&packed, 6).unwrap();
        assert!(unpacked.certificates.is_empty());
        assert!(unpacked.leaf_cert().is_none());
    }

    #[test]
    fn test_unpack_requires_leading_tilde() {
        let authenticator = signed(json!({}));
        assert_eq!(
            BackedAssertion::unpack(&authenticator.encoded, 6).unwrap_err(),
            BidError::InvalidAssertion
        );
        assert_eq!(
            BackedAssertion::unpack("", 6).unwrap_err(),
            BidError::InvalidAssertion
        );
        assert_eq!(
            BackedAssertion::unpack("~", 6).unwrap_err(),
            BidError::InvalidAssertion
        );
    }

    #[test]
    fn test_unpack_enforces_cert_bound() {
        let cert = signed(json!({"iss": "example.org"}));
        let assertion = signed(json!({}));
        let chain = vec![cert.clone(), cert.clone(), cert];

        assert_eq!(
            BackedAssertion::unpack(&BackedAssertion::pack(&chain, &assertion), 2).unwrap_err(),
            BidError::TooManyCerts
        );
    }

    #[test]
    fn test_audience_packing_plain() {
        assert_eq!(
            pack_audience("https://rp.example.com", None, false).unwrap(),
            "https://rp.example.com"
        );
        assert_eq!(
            pack_audience("x", Some(b"cb"), false).unwrap_err(),
            BidError::InvalidParameter("channel bindings need a GSS audience")
        );
    }

    #[test]
    fn test_audience_packing_gss_round_trip() {
        let packed = pack_audience("host/rp.example.com", Some(b"tls-unique:xyz"), true).unwrap();
        assert!(packed.starts_with("urn:x-gss:host/rp.example.com#"));

        let (spn, bindings) = unpack_audience(&packed, true).unwrap();
        assert_eq!(spn, "host/rp.example.com");
        assert_eq!(bindings.as_deref(), Some(&b"tls-unique:xyz"[..]));
    }

    #[test]
    fn test_audience_unpack_rejects_bad_urn() {
        assert!(unpack_audience("https://rp.example.com", true).is_err());
        assert!(unpack_audience("urn:x-gss:", true).is_err());
    }
}
