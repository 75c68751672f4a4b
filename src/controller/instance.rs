//! # Instance Identity
//!
//! Name, namespace and owner of one Kubeturbo resource, plus every name and
//! label derived from them.

use crate::constants;
use crate::controller::reconciler::ReconcilerError;
use crate::crd::Kubeturbo;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

/// Identity of the Kubeturbo resource being reconciled
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub name: String,
    pub namespace: String,
    pub uid: String,
    owner: OwnerReference,
}

impl Instance {
    /// Extract the identity of `kt`
    ///
    /// Fails when the object has no name, namespace or UID, which only happens
    /// for objects that were never persisted.
    pub fn from_resource(kt: &Kubeturbo) -> Result<Self, ReconcilerError> {
        let namespace = kt
            .namespace()
            .ok_or(ReconcilerError::MissingObjectKey(".metadata.namespace"))?;
        let uid = kt
            .uid()
            .ok_or(ReconcilerError::MissingObjectKey(".metadata.uid"))?;
        let owner = kt
            .controller_owner_ref(&())
            .ok_or(ReconcilerError::MissingObjectKey(".metadata.name"))?;

        Ok(Self {
            name: kt.name_any(),
            namespace,
            uid,
            owner,
        })
    }

    /// Controller owner reference pointing at the Kubeturbo resource
    pub fn owner_reference(&self) -> &OwnerReference {
        &self.owner
    }

    /// Value of the `app.kubernetes.io/instance` label: `<name>-<uid>` with the
    /// name shortened so the whole value fits in a label
    pub fn instance_label(&self) -> String {
        let max_name_len = constants::MAX_LABEL_VALUE_LEN.saturating_sub(self.uid.len() + 1);
        let mut end = self.name.len().min(max_name_len);
        while !self.name.is_char_boundary(end) {
            end -= 1;
        }
        let name = self.name[..end].trim_end_matches('-');
        format!("{name}-{}", self.uid)
    }

    /// Labels carried by every managed object
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (constants::LABEL_NAME.to_string(), self.name.clone()),
            (constants::LABEL_INSTANCE.to_string(), self.instance_label()),
            (constants::LABEL_PART_OF.to_string(), self.name.clone()),
            (
                constants::LABEL_COMPONENT.to_string(),
                constants::COMPONENT_KUBETURBO.to_string(),
            ),
            (
                constants::LABEL_MANAGED_BY.to_string(),
                constants::OPERATOR_NAME.to_string(),
            ),
            (
                constants::LABEL_CREATED_BY.to_string(),
                constants::OPERATOR_NAME.to_string(),
            ),
        ])
    }

    /// Selector matching the kubeturbo pods of this instance
    pub fn pod_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(constants::LABEL_NAME.to_string(), self.name.clone())])
    }

    pub fn deployment_name(&self) -> &str {
        &self.name
    }

    pub fn config_map_name(&self) -> String {
        format!("{}-{}", constants::CONFIG_MAP_PREFIX, self.name)
    }

    /// Cluster role name for `role_name`
    ///
    /// The two operator managed roles are made unique per instance; any other
    /// role is referenced verbatim.
    pub fn cluster_role_name(&self, role_name: &str) -> String {
        if is_managed_role(role_name) {
            format!("{role_name}-{}-{}", self.name, self.namespace)
        } else {
            role_name.to_string()
        }
    }

    pub fn cluster_role_binding_name(&self, binding_prefix: &str) -> String {
        format!("{binding_prefix}-{}-{}", self.name, self.namespace)
    }
}

/// Whether the operator owns the rules of the cluster role called `role_name`
pub fn is_managed_role(role_name: &str) -> bool {
    role_name == constants::ROLE_TURBO_ADMIN || role_name == constants::ROLE_TURBO_READER
}

/// Render labels as a label selector string (`k1=v1,k2=v2`)
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::crd::KubeturboSpec;
    use kube::api::ObjectMeta;

    pub(crate) fn kubeturbo(name: &str, namespace: &str, uid: &str) -> Kubeturbo {
        let spec: KubeturboSpec = serde_json::from_value(serde_json::json!({})).unwrap();
        let mut kt = Kubeturbo::new(name, spec);
        kt.metadata = ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(uid.to_string()),
            ..ObjectMeta::default()
        };
        kt
    }

    const UID: &str = "0b6f2a8e-4f8e-4a55-9c43-1b0d9ad2f0c1";

    #[test]
    fn test_instance_label_keeps_short_names() {
        let instance = Instance::from_resource(&kubeturbo("kt", "turbo", UID)).unwrap();
        assert_eq!(instance.instance_label(), format!("kt-{UID}"));
    }

    #[test]
    fn test_instance_label_truncates_long_names() {
        // a 36 char uid leaves 26 chars for the name
        let name = "kubeturbo-release-production-cluster";
        let instance = Instance::from_resource(&kubeturbo(name, "turbo", UID)).unwrap();

        let label = instance.instance_label();
        assert_eq!(label, format!("kubeturbo-release-producti-{UID}"));
        assert_eq!(label.len(), 63);
    }

    #[test]
    fn test_instance_label_trims_trailing_dash_at_cut() {
        let name = "abcdefghijklmnopqrstuvwxy-zzzz";
        let instance = Instance::from_resource(&kubeturbo(name, "turbo", UID)).unwrap();
        assert_eq!(
            instance.instance_label(),
            format!("abcdefghijklmnopqrstuvwxy-{UID}")
        );
    }

    #[test]
    fn test_missing_uid_is_rejected() {
        let mut kt = kubeturbo("kt", "turbo", UID);
        kt.metadata.uid = None;
        assert!(matches!(
            Instance::from_resource(&kt),
            Err(ReconcilerError::MissingObjectKey(".metadata.uid"))
        ));
    }

    #[test]
    fn test_managed_roles_are_made_unique() {
        let instance = Instance::from_resource(&kubeturbo("kt", "turbo", UID)).unwrap();
        assert_eq!(
            instance.cluster_role_name("turbo-cluster-reader"),
            "turbo-cluster-reader-kt-turbo"
        );
        assert_eq!(instance.cluster_role_name("cluster-admin"), "cluster-admin");
        assert_eq!(instance.cluster_role_name("my-role"), "my-role");
        assert_eq!(
            instance.cluster_role_binding_name("turbo-all-binding"),
            "turbo-all-binding-kt-turbo"
        );
        assert_eq!(instance.config_map_name(), "turbo-config-kt");
    }

    #[test]
    fn test_labels_and_selector() {
        let instance = Instance::from_resource(&kubeturbo("kt", "turbo", UID)).unwrap();
        let labels = instance.labels();
        assert_eq!(labels.len(), 6);
        assert_eq!(labels["app.kubernetes.io/managed-by"], "kubeturbo-operator");
        assert_eq!(labels["app.kubernetes.io/component"], "kubeturbo");

        let selector = label_selector(&instance.pod_labels());
        assert_eq!(selector, "app.kubernetes.io/name=kt");
    }
}
