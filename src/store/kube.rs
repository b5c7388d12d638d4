//! # Kubernetes 集群存储
//!
//! 每条路由记录对应三类资源：
//! - Secret `<host>-tls`（`kubernetes.io/tls`）
//! - Ingress `<host>-ingress`，TLS 使用上述 Secret，`/` 前缀路由到租户 Service
//! - ConfigMap `<tenant.name>` 中 `proxies.yaml` 的一条 `{from, to, owner}` 条目
//!
//! Secret 与 Ingress 通过 server-side apply 写入，重复写入是幂等的。

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use ::kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use ::kube::config::{KubeConfigOptions, Kubeconfig};
use ::kube::{Client, Config, Resource};
use serde::{Deserialize, Serialize};

use super::{ClusterStore, RoutingRecord, StoreError, StoreResult};
use crate::config::{StoreConfig, TenantIdentity};
use crate::error::{GatewayError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, linfo};

/// 所有者标签
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// 旧版本使用的所有者标签，读取时同样认可
pub const LEGACY_MANAGED_BY_LABEL: &str = "managed-by";

/// ConfigMap 中保存映射的键
pub const MAPPING_KEY: &str = "proxies.yaml";

/// server-side apply 的 field manager
const FIELD_MANAGER: &str = "prx-gateway";

/// 持久化的映射条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    /// 主机名
    pub from: String,
    /// 后端基础 URL
    pub to: String,
    /// 创建者
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

/// Secret 名称
#[must_use]
pub fn secret_name(host: &str) -> String {
    format!("{host}-tls")
}

/// Ingress 名称
#[must_use]
pub fn ingress_name(host: &str) -> String {
    format!("{host}-ingress")
}

/// Kubernetes 集群存储
pub struct KubeStore {
    client: Client,
    owner: String,
    ingress_class: Option<String>,
    backend_port: u16,
}

impl KubeStore {
    /// 连接集群
    ///
    /// 配置了 base64 kubeconfig 时使用它，否则走默认发现（集群内或 `~/.kube/config`）。
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let client = match config.kubeconfig_b64.as_deref().filter(|v| !v.is_empty()) {
            Some(encoded) => client_from_encoded_kubeconfig(encoded).await?,
            None => Client::try_default().await.map_err(|e| {
                GatewayError::server_init_with_source("failed to create default kube client", e)
            })?,
        };

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Store,
            "kube_connected",
            "Kubernetes 客户端已创建",
            owner = config.owner
        );

        Ok(Self::with_client(client, config))
    }

    /// 使用已有客户端构建
    #[must_use]
    pub fn with_client(client: Client, config: &StoreConfig) -> Self {
        Self {
            client,
            owner: config.owner.clone(),
            ingress_class: config.ingress_class.clone(),
            backend_port: config.backend_port,
        }
    }

    fn labels(&self) -> BTreeMap<String, String> {
        [
            (MANAGED_BY_LABEL.to_string(), self.owner.clone()),
            (LEGACY_MANAGED_BY_LABEL.to_string(), self.owner.clone()),
        ]
        .into_iter()
        .collect()
    }

    fn is_owned(&self, meta: &ObjectMeta) -> bool {
        meta.labels.as_ref().is_some_and(|labels| {
            [MANAGED_BY_LABEL, LEGACY_MANAGED_BY_LABEL]
                .iter()
                .any(|label| labels.get(*label) == Some(&self.owner))
        })
    }

    /// 构建 TLS Secret
    #[must_use]
    pub fn build_secret(&self, namespace: &str, record: &RoutingRecord) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(secret_name(&record.from)),
                namespace: Some(namespace.to_string()),
                labels: Some(self.labels()),
                ..Default::default()
            },
            type_: Some("kubernetes.io/tls".to_string()),
            data: Some(
                [
                    ("tls.crt".to_string(), ByteString(record.cert.clone())),
                    ("tls.key".to_string(), ByteString(record.key.clone())),
                ]
                .into_iter()
                .collect(),
            ),
            ..Default::default()
        }
    }

    /// 构建 Ingress
    #[must_use]
    pub fn build_ingress(&self, tenant: &TenantIdentity, host: &str) -> Ingress {
        Ingress {
            metadata: ObjectMeta {
                name: Some(ingress_name(host)),
                namespace: Some(tenant.namespace.clone()),
                labels: Some(self.labels()),
                ..Default::default()
            },
            spec: Some(IngressSpec {
                ingress_class_name: self.ingress_class.clone(),
                tls: Some(vec![IngressTLS {
                    hosts: Some(vec![host.to_string()]),
                    secret_name: Some(secret_name(host)),
                }]),
                rules: Some(vec![IngressRule {
                    host: Some(host.to_string()),
                    http: Some(HTTPIngressRuleValue {
                        paths: vec![HTTPIngressPath {
                            path: Some("/".to_string()),
                            path_type: "Prefix".to_string(),
                            backend: IngressBackend {
                                service: Some(IngressServiceBackend {
                                    name: tenant.name.clone(),
                                    port: Some(ServiceBackendPort {
                                        number: Some(i32::from(self.backend_port)),
                                        name: None,
                                    }),
                                }),
                                resource: None,
                            },
                        }],
                    }),
                }]),
                default_backend: None,
            }),
            status: None,
        }
    }

    async fn ensure_assignable<K>(&self, api: &Api<K>, name: &str, resource: &str, host: &str) -> StoreResult<()>
    where
        K: Resource + Clone + serde::de::DeserializeOwned + std::fmt::Debug,
    {
        match api.get_opt(name).await.map_err(transport)? {
            Some(existing) if !self.is_owned(existing.meta()) => {
                Err(StoreError::ownership(resource, host))
            }
            _ => Ok(()),
        }
    }

    async fn ensure_owned<K>(&self, api: &Api<K>, name: &str, resource: &str, host: &str) -> StoreResult<()>
    where
        K: Resource + Clone + serde::de::DeserializeOwned + std::fmt::Debug,
    {
        match api.get_opt(name).await.map_err(transport)? {
            Some(existing) if self.is_owned(existing.meta()) => Ok(()),
            _ => Err(StoreError::ownership(resource, host)),
        }
    }

    async fn upsert_mapping(&self, tenant: &TenantIdentity, record: &RoutingRecord) -> StoreResult<()> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &tenant.namespace);
        let entry = MappingEntry {
            from: record.from.clone(),
            to: record.to.clone(),
            owner: Some(self.owner.clone()),
        };

        match api.get_opt(&tenant.name).await.map_err(transport)? {
            Some(mut cm) => {
                let mut entries = decode_mapping(cm.data.as_ref())?;
                upsert_entry(&mut entries, entry);
                cm.data
                    .get_or_insert_with(BTreeMap::new)
                    .insert(MAPPING_KEY.to_string(), encode_mapping(&entries)?);
                api.replace(&tenant.name, &PostParams::default(), &cm)
                    .await
                    .map_err(transport)?;
            }
            None => {
                let cm = ConfigMap {
                    metadata: ObjectMeta {
                        name: Some(tenant.name.clone()),
                        namespace: Some(tenant.namespace.clone()),
                        labels: Some(self.labels()),
                        ..Default::default()
                    },
                    data: Some(
                        [(MAPPING_KEY.to_string(), encode_mapping(&[entry])?)]
                            .into_iter()
                            .collect(),
                    ),
                    ..Default::default()
                };
                api.create(&PostParams::default(), &cm).await.map_err(transport)?;
                linfo!(
                    "system",
                    LogStage::Store,
                    LogComponent::Store,
                    "configmap_created",
                    "创建映射 ConfigMap",
                    name = tenant.name
                );
            }
        }

        Ok(())
    }

    async fn remove_mapping(&self, tenant: &TenantIdentity, host: &str) -> StoreResult<()> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &tenant.namespace);
        let Some(mut cm) = api.get_opt(&tenant.name).await.map_err(transport)? else {
            return Ok(());
        };

        let mut entries = decode_mapping(cm.data.as_ref())?;
        let before = entries.len();
        entries.retain(|entry| entry.from != host);
        if entries.len() == before {
            return Ok(());
        }

        cm.data
            .get_or_insert_with(BTreeMap::new)
            .insert(MAPPING_KEY.to_string(), encode_mapping(&entries)?);
        api.replace(&tenant.name, &PostParams::default(), &cm)
            .await
            .map_err(transport)?;
        Ok(())
    }
}

#[async_trait]
impl ClusterStore for KubeStore {
    async fn get_all(&self, tenant: &TenantIdentity) -> StoreResult<HashMap<String, String>> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &tenant.namespace);
        let cm = api
            .get_opt(&tenant.name)
            .await
            .map_err(transport)?
            .ok_or(StoreError::NotFound)?;

        let entries = decode_mapping(cm.data.as_ref())?;
        ldebug!(
            "system",
            LogStage::Store,
            LogComponent::Store,
            "get_all",
            "读取映射",
            entries = entries.len()
        );

        Ok(entries.into_iter().map(|entry| (entry.from, entry.to)).collect())
    }

    async fn put(&self, tenant: &TenantIdentity, record: &RoutingRecord) -> StoreResult<()> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &tenant.namespace);
        let ingresses: Api<Ingress> = Api::namespaced(self.client.clone(), &tenant.namespace);
        let secret = secret_name(&record.from);
        let ingress = ingress_name(&record.from);

        // 任一资源被其他系统占用时不做任何修改
        self.ensure_assignable(&secrets, &secret, "secret", &record.from).await?;
        self.ensure_assignable(&ingresses, &ingress, "ingress", &record.from).await?;

        let params = PatchParams::apply(FIELD_MANAGER).force();
        secrets
            .patch(&secret, &params, &Patch::Apply(self.build_secret(&tenant.namespace, record)))
            .await
            .map_err(transport)?;
        linfo!(
            "system",
            LogStage::Store,
            LogComponent::Store,
            "secret_applied",
            "TLS Secret 已写入",
            name = secret,
            from = record.from,
            to = record.to
        );

        ingresses
            .patch(&ingress, &params, &Patch::Apply(self.build_ingress(tenant, &record.from)))
            .await
            .map_err(transport)?;
        linfo!(
            "system",
            LogStage::Store,
            LogComponent::Store,
            "ingress_applied",
            "Ingress 已写入",
            name = ingress
        );

        self.upsert_mapping(tenant, record).await
    }

    async fn delete(&self, tenant: &TenantIdentity, host: &str) -> StoreResult<()> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &tenant.namespace);
        let ingresses: Api<Ingress> = Api::namespaced(self.client.clone(), &tenant.namespace);
        let secret = secret_name(host);
        let ingress = ingress_name(host);

        self.ensure_owned(&ingresses, &ingress, "ingress", host).await?;
        self.ensure_owned(&secrets, &secret, "secret", host).await?;

        delete_ignoring_missing(&secrets, &secret).await?;
        linfo!("system", LogStage::Store, LogComponent::Store, "secret_deleted", "TLS Secret 已删除", name = secret);

        delete_ignoring_missing(&ingresses, &ingress).await?;
        linfo!("system", LogStage::Store, LogComponent::Store, "ingress_deleted", "Ingress 已删除", name = ingress);

        self.remove_mapping(tenant, host).await
    }
}

async fn client_from_encoded_kubeconfig(encoded: &str) -> Result<Client> {
    let raw = STANDARD
        .decode(encoded.trim())
        .map_err(|e| GatewayError::config_with_source("kubeconfig is not valid base64", e))?;
    let yaml = String::from_utf8(raw)
        .map_err(|e| GatewayError::config_with_source("kubeconfig is not valid UTF-8", e))?;

    let kubeconfig = Kubeconfig::from_yaml(&yaml)
        .map_err(|e| GatewayError::config_with_source("failed to parse kubeconfig", e))?;
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| GatewayError::config_with_source("failed to load kubeconfig", e))?;

    Client::try_from(config)
        .map_err(|e| GatewayError::server_init_with_source("failed to create kube client", e))
}

async fn delete_ignoring_missing<K>(api: &Api<K>, name: &str) -> StoreResult<()>
where
    K: Resource + Clone + serde::de::DeserializeOwned + std::fmt::Debug,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(::kube::Error::Api(response)) if response.code == 404 => Ok(()),
        Err(e) => Err(transport(e)),
    }
}

fn transport(err: ::kube::Error) -> StoreError {
    StoreError::Transport(err.to_string())
}

/// 解析 ConfigMap 数据中的映射列表
pub fn decode_mapping(data: Option<&BTreeMap<String, String>>) -> StoreResult<Vec<MappingEntry>> {
    match data.and_then(|data| data.get(MAPPING_KEY)) {
        Some(raw) if !raw.trim().is_empty() => serde_yaml::from_str::<Option<Vec<MappingEntry>>>(raw)
            .map(Option::unwrap_or_default)
            .map_err(|e| StoreError::Transport(format!("failed to decode {MAPPING_KEY}: {e}"))),
        _ => Ok(Vec::new()),
    }
}

/// 序列化映射列表
pub fn encode_mapping(entries: &[MappingEntry]) -> StoreResult<String> {
    serde_yaml::to_string(entries)
        .map_err(|e| StoreError::Transport(format!("failed to encode {MAPPING_KEY}: {e}")))
}

/// 按 `from` 插入或替换
pub fn upsert_entry(entries: &mut Vec<MappingEntry>, entry: MappingEntry) {
    match entries.iter_mut().find(|existing| existing.from == entry.from) {
        Some(existing) => *existing = entry,
        None => entries.push(entry),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(from: &str, to: &str) -> MappingEntry {
        MappingEntry {
            from: from.to_string(),
            to: to.to_string(),
            owner: Some("prx".to_string()),
        }
    }

    #[test]
    fn test_resource_names() {
        assert_eq!(secret_name("a.example.com"), "a.example.com-tls");
        assert_eq!(ingress_name("a.example.com"), "a.example.com-ingress");
    }

    #[test]
    fn test_decode_legacy_entries_without_owner() {
        let data: BTreeMap<String, String> = [(
            MAPPING_KEY.to_string(),
            "- from: a.example.com\n  to: http://a\n- from: b.example.com\n  to: http://b\n".to_string(),
        )]
        .into_iter()
        .collect();

        let entries = decode_mapping(Some(&data)).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].owner, None);
        assert_eq!(entries[1].to, "http://b");
    }

    #[test]
    fn test_decode_missing_or_empty() {
        assert!(decode_mapping(None).unwrap().is_empty());

        let data: BTreeMap<String, String> = [(MAPPING_KEY.to_string(), String::new())].into_iter().collect();
        assert!(decode_mapping(Some(&data)).unwrap().is_empty());
    }

    #[test]
    fn test_decode_garbage() {
        let data: BTreeMap<String, String> =
            [(MAPPING_KEY.to_string(), "{not: [a list".to_string())].into_iter().collect();
        assert!(matches!(decode_mapping(Some(&data)), Err(StoreError::Transport(_))));
    }

    #[test]
    fn test_upsert_entry_replaces_by_host() {
        let mut entries = vec![entry("a.example.com", "http://a"), entry("b.example.com", "http://b")];
        upsert_entry(&mut entries, entry("a.example.com", "http://a2"));
        upsert_entry(&mut entries, entry("c.example.com", "http://c"));

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].to, "http://a2");

        let encoded = encode_mapping(&entries).unwrap();
        let data: BTreeMap<String, String> = [(MAPPING_KEY.to_string(), encoded)].into_iter().collect();
        assert_eq!(decode_mapping(Some(&data)).unwrap(), entries);
    }
}
