//! Wire types for the confidential-compute control plane.

use serde::{Deserialize, Deserializer, Serialize};

use crate::config::DeploymentConfig;

pub const MANIFEST_VERSION: u32 = 2;
pub const DEFAULT_FEATURES: [&str; 2] = ["kms", "tproxy-net"];

/// Registry credentials for private workload images (empty for public ones).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DockerRegistryConfig {
    pub url: String,
    pub username: String,
    pub password: String,
}

/// Workload definition plus instance feature set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComposeManifest {
    pub docker_compose_file: String,
    pub docker_config: DockerRegistryConfig,
    pub features: Vec<String>,
    pub kms_enabled: bool,
    pub manifest_version: u32,
    pub name: String,
    pub public_logs: bool,
    pub public_sysinfo: bool,
    pub tproxy_enabled: bool,
}

/// Immutable description of one instance to launch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VmConfiguration {
    pub teepod_id: u32,
    pub name: String,
    pub image: String,
    pub vcpu: u32,
    pub memory: u32,
    pub disk_size: u32,
    pub compose_manifest: ComposeManifest,
    pub listed: bool,
}

impl VmConfiguration {
    /// Build the configuration for one deploy call.
    pub fn new(config: &DeploymentConfig, compose_file_contents: String) -> Self {
        Self {
            teepod_id: config.teepod_id,
            name: config.app_name.clone(),
            image: config.image.clone(),
            vcpu: config.vcpu,
            memory: config.memory_mb,
            disk_size: config.disk_gb,
            compose_manifest: ComposeManifest {
                docker_compose_file: compose_file_contents,
                docker_config: DockerRegistryConfig::default(),
                features: DEFAULT_FEATURES.iter().map(|f| f.to_string()).collect(),
                kms_enabled: true,
                manifest_version: MANIFEST_VERSION,
                name: config.app_name.clone(),
                public_logs: true,
                public_sysinfo: true,
                tproxy_enabled: true,
            },
            listed: false,
        }
    }
}

/// Encryption key bound to the attested identity of the instance-to-be.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttestationPubkey {
    #[serde(rename = "app_env_encrypt_pubkey")]
    pub encryption_public_key: String,
    pub app_id_salt: String,
}

/// Final create payload: the VM configuration plus the sealed secrets.
#[derive(Debug, Serialize)]
pub(crate) struct CreateInstanceRequest<'a> {
    #[serde(flatten)]
    pub config: &'a VmConfiguration,
    pub encrypted_env: &'a str,
    pub app_env_encrypt_pubkey: &'a str,
    pub app_id_salt: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateInstanceResponse {
    pub app_id: String,
}

/// The control plane sends `null` for fields that have no value yet.
fn null_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicUrl {
    #[serde(default, deserialize_with = "null_or_default")]
    pub app: String,
    #[serde(default, deserialize_with = "null_or_default")]
    pub instance: String,
}

/// Network status of a launched instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceNetwork {
    #[serde(default, deserialize_with = "null_or_default")]
    pub is_online: bool,
    #[serde(default, deserialize_with = "null_or_default")]
    pub is_public: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub internal_ip: Option<String>,
    #[serde(default)]
    pub latest_handshake: Option<String>,
    #[serde(default, deserialize_with = "null_or_default")]
    pub public_urls: Vec<PublicUrl>,
}

impl InstanceNetwork {
    /// First externally reachable app URL, if one has been assigned.
    pub fn app_url(&self) -> Option<&str> {
        self.public_urls
            .iter()
            .map(|url| url.app.trim())
            .find(|app| !app.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceResources {
    #[serde(default, deserialize_with = "null_or_default")]
    pub memory: u32,
    #[serde(default, deserialize_with = "null_or_default")]
    pub disk_size: u32,
    #[serde(default, deserialize_with = "null_or_default")]
    pub vcpu: u32,
}

/// Runtime details of a hosted instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostedInstance {
    #[serde(default, deserialize_with = "null_or_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_or_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_or_default")]
    pub status: String,
    #[serde(default)]
    pub uptime: Option<String>,
    #[serde(default)]
    pub app_url: Option<String>,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub boot_progress: Option<String>,
    #[serde(default)]
    pub boot_error: Option<String>,
    #[serde(default)]
    pub image_version: Option<String>,
    #[serde(default)]
    pub configuration: Option<InstanceResources>,
}

/// One entry of the account's instance listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceSummary {
    #[serde(default)]
    pub hosted: Option<HostedInstance>,
    #[serde(default, deserialize_with = "null_or_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_or_default")]
    pub listed: bool,
    #[serde(default, deserialize_with = "null_or_default")]
    pub status: String,
    #[serde(default, deserialize_with = "null_or_default")]
    pub in_progress: bool,
    #[serde(default)]
    pub dapp_dashboard_url: Option<String>,
}

/// Account resolved from the API key.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ControlPlaneUser {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AuthMeResponse {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserSearchResponse {
    #[serde(default, deserialize_with = "null_or_default")]
    pub users: Vec<UserSearchEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserSearchEntry {
    pub id: serde_json::Value,
}

impl UserSearchEntry {
    /// User ids come back as either numbers or strings.
    pub fn id_string(&self) -> Option<String> {
        match &self.id {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn vm_configuration_carries_defaults() {
        let config = DeploymentConfig::default();
        let vm = VmConfiguration::new(&config, "services: {}".to_string());

        let value = serde_json::to_value(&vm).unwrap();
        assert_eq!(value["teepod_id"], 2);
        assert_eq!(value["image"], "dstack-dev-0.3.4");
        assert_eq!(value["memory"], 2048);
        assert_eq!(value["compose_manifest"]["features"], json!(["kms", "tproxy-net"]));
        assert_eq!(value["compose_manifest"]["manifest_version"], 2);
        assert_eq!(value["compose_manifest"]["docker_compose_file"], "services: {}");
        assert_eq!(value["listed"], false);
    }

    #[test]
    fn create_request_flattens_configuration() {
        let vm = VmConfiguration::new(&DeploymentConfig::default(), String::new());
        let request = CreateInstanceRequest {
            config: &vm,
            encrypted_env: "beef",
            app_env_encrypt_pubkey: "aa",
            app_id_salt: "salt",
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["name"], "agentlaunchpadstarterkit");
        assert_eq!(value["encrypted_env"], "beef");
        assert_eq!(value["app_id_salt"], "salt");
    }

    #[test]
    fn network_without_urls_has_no_app_url() {
        let network: InstanceNetwork =
            serde_json::from_value(json!({"is_online": false, "public_urls": []})).unwrap();
        assert_eq!(network.app_url(), None);

        let network: InstanceNetwork = serde_json::from_value(json!({
            "public_urls": [{"app": "https://abc-4000.dstack.example", "instance": "i"}]
        }))
        .unwrap();
        assert_eq!(network.app_url(), Some("https://abc-4000.dstack.example"));
    }

    #[test]
    fn null_fields_fall_back_to_defaults() {
        let network: InstanceNetwork = serde_json::from_value(json!({
            "is_online": null,
            "is_public": true,
            "public_urls": null,
            "error": null
        }))
        .unwrap();
        assert!(!network.is_online);
        assert!(network.public_urls.is_empty());
        assert_eq!(network.app_url(), None);

        let network: InstanceNetwork = serde_json::from_value(json!({
            "public_urls": [{"app": null, "instance": null}]
        }))
        .unwrap();
        assert_eq!(network.app_url(), None);

        let summary: InstanceSummary =
            serde_json::from_value(json!({"name": null, "status": "running", "hosted": null}))
                .unwrap();
        assert_eq!(summary.name, "");
        assert_eq!(summary.status, "running");
    }

    #[test]
    fn user_ids_accept_numbers_and_strings() {
        let numeric: UserSearchEntry = serde_json::from_value(json!({"id": 42})).unwrap();
        let text: UserSearchEntry = serde_json::from_value(json!({"id": "u-1"})).unwrap();
        let missing: UserSearchEntry = serde_json::from_value(json!({"id": null})).unwrap();

        assert_eq!(numeric.id_string().as_deref(), Some("42"));
        assert_eq!(text.id_string().as_deref(), Some("u-1"));
        assert_eq!(missing.id_string(), None);
    }
}
