//! Client configuration documents and their derivation.
//!
//! The platform consumes a JSON configuration document of the form:
//!
//! ```json
//! {
//!   "client_id": "...",
//!   "redirect_uri": "...",
//!   "authorities": [
//!     { "type": "AAD", "audience": { "type": "AzureADMyOrg", "tenant_id": "..." } }
//!   ]
//! }
//! ```
//!
//! [`ConfigDeriver`] starts from a base template and applies caller overrides.
//! Fields this crate does not model are carried through untouched so the
//! platform sees the template exactly as written apart from the overrides.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config_store::ConfigStore;
use crate::error::BrokerError;

/// The template used when no other base is configured.
pub const DEFAULT_TEMPLATE: &str = include_str!("../templates/default_config.json");

/// Host used to build authority URLs for authorities that do not carry one.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Kind of authority entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorityType {
    /// Microsoft Entra ID (Azure AD).
    Aad,
    /// Any other authority type, kept verbatim.
    Other(String),
}

impl AuthorityType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Aad => "AAD",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for AuthorityType {
    fn from(s: String) -> Self {
        if s == "AAD" { Self::Aad } else { Self::Other(s) }
    }
}

impl From<AuthorityType> for String {
    fn from(t: AuthorityType) -> Self {
        t.as_str().to_string()
    }
}

impl Serialize for AuthorityType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AuthorityType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from)
    }
}

impl fmt::Display for AuthorityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Audience of an authority entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Audience {
    #[serde(rename = "type")]
    pub audience_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One entry of the `authorities` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Authority {
    #[serde(rename = "type")]
    pub authority_type: AuthorityType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<Audience>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Authority {
    /// Tenant id of this authority's audience, if any.
    pub fn tenant_id(&self) -> Option<&str> {
        self.audience.as_ref().and_then(|a| a.tenant_id.as_deref())
    }

    /// URL accounts issued by this authority are recorded against.
    ///
    /// Uses an explicit `authority_url` field when the entry carries one.
    pub fn authority_url(&self) -> String {
        if let Some(url) = self.extra.get("authority_url").and_then(Value::as_str) {
            return url.to_string();
        }
        format!(
            "{}/{}",
            DEFAULT_AUTHORITY_HOST,
            self.tenant_id().unwrap_or("common")
        )
    }
}

/// A client configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfiguration {
    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub redirect_uri: String,

    pub authorities: Vec<Authority>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ClientConfiguration {
    /// Parse a configuration document.
    ///
    /// A document without an `authorities` array is malformed.
    pub fn from_json(json: &str) -> Result<Self, BrokerError> {
        serde_json::from_str(json)
            .map_err(|e| BrokerError::config(format!("malformed client configuration: {}", e)))
    }

    /// Read a configuration document from disk.
    pub fn load_from_path(path: &Path) -> Result<Self, BrokerError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            BrokerError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&contents)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// The first (default) authority entry.
    pub fn default_authority(&self) -> Option<&Authority> {
        self.authorities.first()
    }
}

/// Extract the tenant id from an authority URL: its last path segment.
///
/// Trailing slashes are ignored. A URL with no path segment at all has no
/// tenant and is rejected. A value without a scheme is taken as a path.
pub fn tenant_from_authority(authority: &str) -> Result<&str, BrokerError> {
    let path = match authority.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, path)| path).unwrap_or(""),
        None => authority,
    };
    let tenant = path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("");
    if tenant.is_empty() {
        return Err(BrokerError::config(format!(
            "authority {} has no tenant segment",
            authority
        )));
    }
    Ok(tenant)
}

/// Derive an effective configuration from `base` and caller overrides.
///
/// With neither `authority` nor `redirect_uri`, only the client id is
/// substituted. Otherwise the tenant id of the first authority's audience
/// and/or the top-level redirect URI are overwritten as well.
pub fn derive(
    base: &ClientConfiguration,
    client_id: &str,
    authority: Option<&str>,
    redirect_uri: Option<&str>,
) -> Result<ClientConfiguration, BrokerError> {
    if client_id.is_empty() {
        return Err(BrokerError::config("client id must not be empty"));
    }

    let mut config = base.clone();

    if let Some(authority) = authority {
        let tenant_id = tenant_from_authority(authority)?;
        let audience = config
            .authorities
            .first_mut()
            .ok_or_else(|| BrokerError::config("base configuration has no authorities"))?
            .audience
            .as_mut()
            .ok_or_else(|| BrokerError::config("default authority has no audience"))?;
        debug!("Replacing tenant_id with {}", tenant_id);
        audience.tenant_id = Some(tenant_id.to_string());
    }

    if let Some(redirect_uri) = redirect_uri {
        debug!("Replacing redirect_uri with {}", redirect_uri);
        config.redirect_uri = redirect_uri.to_string();
    }

    config.client_id = client_id.to_string();
    Ok(config)
}

/// Where the platform should read the client configuration from.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// The base template with only the client id substituted. Nothing was
    /// written to disk.
    Template(ClientConfiguration),

    /// A customized configuration persisted at `path`.
    Persisted {
        path: PathBuf,
        config: ClientConfiguration,
    },
}

impl ConfigSource {
    /// The effective configuration.
    pub fn config(&self) -> &ClientConfiguration {
        match self {
            Self::Template(config) => config,
            Self::Persisted { config, .. } => config,
        }
    }

    /// The client id the configuration is bound to.
    pub fn client_id(&self) -> &str {
        &self.config().client_id
    }
}

/// Produces effective client configurations from a fixed base template.
#[derive(Debug, Clone)]
pub struct ConfigDeriver {
    base: ClientConfiguration,
}

impl ConfigDeriver {
    /// Create a deriver over an already parsed base.
    pub fn new(base: ClientConfiguration) -> Self {
        Self { base }
    }

    /// Create a deriver from a JSON template.
    pub fn from_template(json: &str) -> Result<Self, BrokerError> {
        Ok(Self::new(ClientConfiguration::from_json(json)?))
    }

    /// Create a deriver over the embedded default template.
    pub fn with_default_template() -> Result<Self, BrokerError> {
        Self::from_template(DEFAULT_TEMPLATE)
    }

    /// The base template.
    pub fn base(&self) -> &ClientConfiguration {
        &self.base
    }

    /// See [`derive`].
    pub fn derive(
        &self,
        client_id: &str,
        authority: Option<&str>,
        redirect_uri: Option<&str>,
    ) -> Result<ClientConfiguration, BrokerError> {
        derive(&self.base, client_id, authority, redirect_uri)
    }

    /// Derive a configuration and decide where the platform reads it from.
    ///
    /// Customized configurations are persisted through `store` first.
    pub fn prepare(
        &self,
        client_id: &str,
        authority: Option<&str>,
        redirect_uri: Option<&str>,
        store: &dyn ConfigStore,
    ) -> Result<ConfigSource, BrokerError> {
        let config = self.derive(client_id, authority, redirect_uri)?;

        if authority.is_none() && redirect_uri.is_none() {
            debug!("No overrides for {}, using the default template", client_id);
            return Ok(ConfigSource::Template(config));
        }

        let path = store.persist(&config)?;
        info!("Persisted client configuration to {:?}", path);
        Ok(ConfigSource::Persisted { path, config })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TENANT: &str = "3f9f5fd2-5517-43f7-baa3-63ee31f79721";

    fn deriver() -> ConfigDeriver {
        ConfigDeriver::with_default_template().unwrap()
    }

    #[test]
    fn test_default_template_parses() {
        let base = deriver().base().clone();
        assert_eq!(base.authorities.len(), 1);
        assert_eq!(base.authorities[0].authority_type, AuthorityType::Aad);
        assert_eq!(base.authorities[0].tenant_id(), Some("0000-default"));
    }

    #[test]
    fn test_tenant_override_from_authority_url() {
        let authority = format!("https://login.example.com/{}", TENANT);
        let config = deriver().derive("id1", Some(&authority), None).unwrap();

        assert_eq!(config.authorities[0].tenant_id(), Some(TENANT));
        assert_eq!(config.client_id, "id1");
        assert_eq!(config.redirect_uri, deriver().base().redirect_uri);
    }

    #[test]
    fn test_redirect_override() {
        let config = deriver()
            .derive("id1", None, Some("msauth://app/abc%3D"))
            .unwrap();
        assert_eq!(config.redirect_uri, "msauth://app/abc%3D");
        assert_eq!(config.authorities[0].tenant_id(), Some("0000-default"));
    }

    #[test]
    fn test_no_overrides_only_substitutes_client_id() {
        let d = deriver();
        let config = d.derive("id1", None, None).unwrap();
        let mut expected = d.base().clone();
        expected.client_id = "id1".to_string();
        assert_eq!(config, expected);
    }

    #[test]
    fn test_only_first_authority_is_overridden() {
        let json = r#"{
            "client_id": "x",
            "authorities": [
                {"type": "AAD", "audience": {"type": "AzureADMyOrg", "tenant_id": "first"}},
                {"type": "B2C", "authority_url": "https://b2c.example.com/policy"}
            ]
        }"#;
        let d = ConfigDeriver::from_template(json).unwrap();
        let config = d.derive("id1", Some("https://login.example.com/new"), None).unwrap();

        assert_eq!(config.authorities[0].tenant_id(), Some("new"));
        assert_eq!(config.authorities[1], d.base().authorities[1]);
        assert_eq!(
            config.authorities[1].authority_type,
            AuthorityType::Other("B2C".to_string())
        );
    }

    #[test]
    fn test_unknown_fields_preserved() {
        let config = deriver().derive("id1", Some("https://h/t"), None).unwrap();
        let json: Value = serde_json::from_str(&config.to_json_pretty().unwrap()).unwrap();
        assert_eq!(json["account_mode"], "MULTIPLE");
        assert_eq!(json["broker_redirect_uri_registered"], false);
        assert_eq!(json["authorities"][0]["audience"]["tenant_id"], "t");
    }

    #[test]
    fn test_missing_authorities_is_config_error() {
        let result = ConfigDeriver::from_template(r#"{"client_id": "x"}"#);
        assert!(matches!(result, Err(BrokerError::Config { .. })));
    }

    #[test]
    fn test_empty_client_id_is_config_error() {
        let result = deriver().derive("", None, None);
        assert!(matches!(result, Err(BrokerError::Config { .. })));
    }

    #[test]
    fn test_tenant_override_without_authorities_fails() {
        let d = ConfigDeriver::from_template(r#"{"authorities": []}"#).unwrap();
        let result = d.derive("id1", Some("https://h/t"), None);
        assert!(matches!(result, Err(BrokerError::Config { .. })));
    }

    #[test]
    fn test_tenant_from_authority() {
        assert_eq!(tenant_from_authority("https://h/a/b/tenant").unwrap(), "tenant");
        assert_eq!(tenant_from_authority("tenant-only").unwrap(), "tenant-only");
        assert!(tenant_from_authority("https://h/").is_err());
        assert!(tenant_from_authority("https://h").is_err());
        assert!(tenant_from_authority("").is_err());
    }

    #[test]
    fn test_tenant_from_authority_ignores_trailing_slash() {
        assert_eq!(
            tenant_from_authority("https://login.microsoftonline.com/contoso.onmicrosoft.com/")
                .unwrap(),
            "contoso.onmicrosoft.com"
        );
        assert_eq!(tenant_from_authority("https://h/tenant//").unwrap(), "tenant");

        let config = deriver()
            .derive("id1", Some("https://login.example.com/tenant-a/"), None)
            .unwrap();
        assert_eq!(config.authorities[0].tenant_id(), Some("tenant-a"));
    }

    #[test]
    fn test_authority_url() {
        let config = deriver().derive("id1", Some("https://h/abc"), None).unwrap();
        assert_eq!(
            config.default_authority().unwrap().authority_url(),
            "https://login.microsoftonline.com/abc"
        );
    }
}
