//! Verified Identities
//!
//! The materialized result of a successful verification: public attributes
//! callers may read, private attributes (ticket, authenticator root key,
//! assertion expiry) the reauth machinery maintains, and an optional
//! session key that is zeroed when the identity is dropped.

// Layer 2: Third-party crate imports
use serde_json::{json, Map, Value};
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::*;

// Layer 3: Internal module imports
use crate::crypto::secret::SecretBytes;
use crate::error::{BidError, BidResult};
use crate::jose::jwk::Jwk;
use crate::json::{self, Timestamp};

/// A verified identity.
#[derive(Debug)]
pub struct Identity {
    attributes: Value,
    private_attributes: Value,
    session_key: Option<SecretBytes>,
}

impl Identity {
    /// Wrap an attribute bag as an identity.
    pub(crate) fn new(attributes: Value) -> Self {
        Self {
            attributes,
            private_attributes: json!({}),
            session_key: None,
        }
    }

    /// Materialize an identity from the final assertion and its leaf
    /// certificate, enriching from an embedded `x5c` chain when present.
    pub(crate) fn from_assertion(
        assertion_payload: &Value,
        leaf_cert_payload: &Value,
    ) -> BidResult<Self> {
        let mut attributes = Map::new();

        if let Some(aud) = assertion_payload.get("aud") {
            attributes.insert("audience".to_string(), aud.clone());
        }
        if let Some(exp) = assertion_payload.get("exp") {
            attributes.insert("expires".to_string(), exp.clone());
        }
        if let Some(iss) = leaf_cert_payload.get("iss") {
            attributes.insert("issuer".to_string(), iss.clone());
        }

        let mut attributes = Value::Object(attributes);

        if let Some(key_value) = leaf_cert_payload.get("public-key") {
            let jwk = Jwk::from_value(key_value.clone())?;
            if jwk.x5c().is_some() {
                enrich_from_x5c(&mut attributes, &jwk)?;
            }
        }

        // The JSON principal wins over anything the certificate said.
        if let Some(principal) = leaf_cert_payload.get("principal") {
            let email = json::str_value(principal, "email")
                .ok_or(BidError::UnknownPrincipalType)?
                .to_string();
            set_attr(&mut attributes, "principal", principal.clone());
            set_attr(&mut attributes, "email", Value::String(email.clone()));
            set_attr(&mut attributes, "sub", Value::String(email));
        }

        if json::str_value(&attributes, "email").is_none() {
            return Err(BidError::MissingPrincipal);
        }

        Ok(Self::new(attributes))
    }

    /// The certified email address.
    pub fn email(&self) -> Option<&str> {
        json::str_value(&self.attributes, "email")
    }

    /// The audience the assertion was issued to.
    pub fn audience(&self) -> Option<&str> {
        json::str_value(&self.attributes, "audience")
    }

    /// The certifying issuer.
    pub fn issuer(&self) -> Option<&str> {
        json::str_value(&self.attributes, "issuer")
    }

    /// Assertion expiry, milliseconds.
    pub fn expires(&self) -> Option<Timestamp> {
        json::ts_value(&self.attributes, "expires")
    }

    /// The subject name.
    pub fn subject(&self) -> Option<&str> {
        json::str_value(&self.attributes, "sub")
    }

    /// Any public attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// The full public attribute bag.
    pub fn attributes(&self) -> &Value {
        &self.attributes
    }

    /// The reauthentication ticket `{jti, exp}`, present after the
    /// credential record has been registered.
    pub fn ticket(&self) -> Option<&Value> {
        self.private_attributes.get("tkt")
    }

    /// The session key, present after reauthentication or once the
    /// security-context layer installs one.
    pub fn session_key(&self) -> Option<&SecretBytes> {
        self.session_key.as_ref()
    }

    /// Install a session key established by the security-context layer.
    pub fn set_session_key(&mut self, key: SecretBytes) {
        self.session_key = Some(key);
    }

    /// Discard the session key, zeroing its bytes.
    pub fn clear_session_key(&mut self) {
        self.session_key = None;
    }

    pub(crate) fn private_attributes_mut(&mut self) -> &mut Value {
        &mut self.private_attributes
    }

    /// Merge validated attribute-certificate claims into the public bag.
    pub(crate) fn merge_attributes(&mut self, claims: Value) {
        if let (Some(target), Some(source)) =
            (self.attributes.as_object_mut(), claims.as_object())
        {
            for (key, value) in source {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

fn set_attr(attributes: &mut Value, key: &str, value: Value) {
    if let Some(map) = attributes.as_object_mut() {
        map.insert(key.to_string(), value);
    }
}

/// Populate `sub`, `principal` and `eku` from the first certificate of an
/// `x5c` chain.
fn enrich_from_x5c(attributes: &mut Value, jwk: &Jwk) -> BidResult<()> {
    let der = jwk.x5c_der(0)?;
    let (_, cert) = X509Certificate::from_der(&der).map_err(|_| BidError::MissingCert)?;

    if let Some(cn) = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
    {
        set_attr(attributes, "sub", Value::String(cn.to_string()));
    }

    let mut principal = Map::new();
    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            match name {
                GeneralName::RFC822Name(email) => {
                    principal.insert("email".to_string(), Value::String((*email).to_string()));
                }
                GeneralName::DNSName(host) => {
                    principal.insert("hostname".to_string(), Value::String((*host).to_string()));
                }
                GeneralName::URI(uri) => {
                    principal.insert("uri".to_string(), Value::String((*uri).to_string()));
                }
                GeneralName::OtherName(oid, _) => {
                    principal.insert(
                        "othername".to_string(),
                        json!({"oid": oid.to_id_string()}),
                    );
                }
                _ => {}
            }
        }
    }
    if !principal.is_empty() {
        if let Some(email) = principal.get("email").cloned() {
            set_attr(attributes, "email", email);
        }
        set_attr(attributes, "principal", Value::Object(principal));
    }

    if let Ok(Some(eku)) = cert.extended_key_usage() {
        let mut oids: Vec<Value> = Vec::new();
        let usage = eku.value;
        if usage.any {
            oids.push(Value::String("2.5.29.37.0".to_string()));
        }
        if usage.server_auth {
            oids.push(Value::String("1.3.6.1.5.5.7.3.1".to_string()));
        }
        if usage.client_auth {
            oids.push(Value::String("1.3.6.1.5.5.7.3.2".to_string()));
        }
        if usage.code_signing {
            oids.push(Value::String("1.3.6.1.5.5.7.3.3".to_string()));
        }
        if usage.email_protection {
            oids.push(Value::String("1.3.6.1.5.5.7.3.4".to_string()));
        }
        if usage.time_stamping {
            oids.push(Value::String("1.3.6.1.5.5.7.3.8".to_string()));
        }
        if usage.ocsp_signing {
            oids.push(Value::String("1.3.6.1.5.5.7.3.9".to_string()));
        }
        for oid in &usage.other {
            oids.push(Value::String(oid.to_id_string()));
        }
        set_attr(attributes, "eku", Value::Array(oids));
    }

    Ok(())
}
