//! # Spec Defaults
//!
//! Fills computed defaults into a freshly fetched Kubeturbo spec and checks that
//! every field the kubeturbo pod needs to start is present.
//!
//! A failed check is a pause, not an error to retry: the pass ends without a
//! requeue and resumes as soon as the resource is edited.

use crate::constants;
use crate::crd::KubeturboSpec;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors raised while defaulting or validating a spec
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DefaultsError {
    #[error("environment variable {0} is not set, cannot determine the default kubeturbo version")]
    MissingDefaultVersion(&'static str),

    #[error(
        "stopping reconciliation for Kubeturbo CR due to missing critical field(s): {}. Please review your CR and ensure the latest CRD is applied before proceeding",
        .0.join(", ")
    )]
    MissingFields(Vec<&'static str>),

    #[error("default kubeturbo version is already set to {0}")]
    AlreadySet(String),
}

/// Version used when a resource leaves its image tag or server version unset
///
/// Set at most once (normally at startup from `DEFAULT_KUBETURBO_VERSION`) and
/// read by every reconcile pass afterwards.
#[derive(Debug, Default)]
pub struct DefaultVersion {
    value: OnceLock<String>,
}

impl DefaultVersion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an already initialized value
    pub fn with_value(version: impl Into<String>) -> Self {
        let value = OnceLock::new();
        let _ = value.set(version.into());
        Self { value }
    }

    /// Initialize from `DEFAULT_KUBETURBO_VERSION`, leaving the value unset
    /// when the variable is missing or empty
    pub fn from_env() -> Self {
        match std::env::var(constants::DEFAULT_VERSION_ENV_VAR) {
            Ok(version) if !version.trim().is_empty() => Self::with_value(version.trim()),
            _ => Self::new(),
        }
    }

    /// Assign the version. Fails if a value was assigned before.
    pub fn set(&self, version: impl Into<String>) -> Result<(), DefaultsError> {
        self.value.set(version.into()).map_err(|_rejected| {
            DefaultsError::AlreadySet(self.get().unwrap_or_default().to_string())
        })
    }

    pub fn get(&self) -> Option<&str> {
        self.value.get().map(String::as_str)
    }
}

/// A required spec field and how to tell whether it holds a value
struct RequiredField {
    path: &'static str,
    is_set: fn(&KubeturboSpec) -> bool,
}

fn has_text(value: &str) -> bool {
    !value.is_empty()
}

fn has_optional_text(value: Option<&String>) -> bool {
    value.is_some_and(|v| !v.is_empty())
}

/// Fields without which the kubeturbo pod cannot launch, in spec order
const REQUIRED_FIELDS: &[RequiredField] = &[
    RequiredField {
        path: "Spec.RoleName",
        is_set: |s| has_text(&s.role_name),
    },
    RequiredField {
        path: "Spec.RoleBinding",
        is_set: |s| has_text(&s.role_binding),
    },
    RequiredField {
        path: "Spec.ServiceAccountName",
        is_set: |s| has_text(&s.service_account_name),
    },
    RequiredField {
        path: "Spec.Image.Repository",
        is_set: |s| has_text(&s.image.repository),
    },
    RequiredField {
        path: "Spec.Image.Tag",
        is_set: |s| has_optional_text(s.image.tag.as_ref()),
    },
    RequiredField {
        path: "Spec.ServerMeta.Version",
        is_set: |s| has_optional_text(s.server_meta.version.as_ref()),
    },
    RequiredField {
        path: "Spec.ServerMeta.TurboServer",
        is_set: |s| has_text(&s.server_meta.turbo_server),
    },
    RequiredField {
        path: "Spec.RestAPIConfig.TurbonomicCredentialsSecretName",
        is_set: |s| has_text(&s.rest_api_config.turbonomic_credentials_secret_name),
    },
    RequiredField {
        path: "Spec.HANodeConfig.NodeRoles",
        is_set: |s| has_text(&s.ha_node_config.node_roles),
    },
];

fn needs_default_version(value: Option<&String>) -> bool {
    value.is_none_or(|v| v == constants::VERSION_PLACEHOLDER)
}

/// Apply computed defaults to `spec`, then verify the required fields
///
/// - an unset or `VERSION` image tag / server version becomes the default version
/// - the `kubeturbo.io/controllable` annotation is added when absent
/// - system namespace patterns are seeded when the list is unset
pub fn apply_defaults(
    spec: &mut KubeturboSpec,
    default_version: &DefaultVersion,
) -> Result<(), DefaultsError> {
    let version = default_version
        .get()
        .ok_or(DefaultsError::MissingDefaultVersion(
            constants::DEFAULT_VERSION_ENV_VAR,
        ))?;

    if needs_default_version(spec.image.tag.as_ref()) {
        spec.image.tag = Some(version.to_string());
    }
    if needs_default_version(spec.server_meta.version.as_ref()) {
        spec.server_meta.version = Some(version.to_string());
    }

    spec.annotations
        .entry(constants::DEFAULT_ANNOTATION_KEY.to_string())
        .or_insert_with(|| constants::DEFAULT_ANNOTATION_VALUE.to_string());

    if spec.system_workload_detectors.namespace_patterns.is_none() {
        spec.system_workload_detectors.namespace_patterns =
            Some(super::default_system_namespace_patterns());
    }

    verify_required_fields(spec)
}

/// Collect every required field that is empty or unset
pub fn verify_required_fields(spec: &KubeturboSpec) -> Result<(), DefaultsError> {
    let missing: Vec<&'static str> = REQUIRED_FIELDS
        .iter()
        .filter(|field| !(field.is_set)(spec))
        .map(|field| field.path)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(DefaultsError::MissingFields(missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_from(value: serde_json::Value) -> KubeturboSpec {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_placeholder_and_unset_versions_take_default() {
        let mut spec = spec_from(serde_json::json!({
            "image": { "tag": "VERSION" }
        }));
        apply_defaults(&mut spec, &DefaultVersion::with_value("8.14.6")).unwrap();

        assert_eq!(spec.image.tag.as_deref(), Some("8.14.6"));
        assert_eq!(spec.server_meta.version.as_deref(), Some("8.14.6"));
    }

    #[test]
    fn test_explicit_versions_are_kept() {
        let mut spec = spec_from(serde_json::json!({
            "image": { "tag": "8.13.0" },
            "serverMeta": { "version": "8.13.1" }
        }));
        apply_defaults(&mut spec, &DefaultVersion::with_value("8.14.6")).unwrap();

        assert_eq!(spec.image.tag.as_deref(), Some("8.13.0"));
        assert_eq!(spec.server_meta.version.as_deref(), Some("8.13.1"));
    }

    #[test]
    fn test_missing_default_version_is_reported() {
        let mut spec = spec_from(serde_json::json!({}));
        let err = apply_defaults(&mut spec, &DefaultVersion::new()).unwrap_err();
        assert_eq!(
            err,
            DefaultsError::MissingDefaultVersion("DEFAULT_KUBETURBO_VERSION")
        );
    }

    #[test]
    fn test_controllable_annotation_is_seeded_next_to_user_annotations() {
        let mut spec = spec_from(serde_json::json!({
            "annotations": { "team": "platform" }
        }));
        apply_defaults(&mut spec, &DefaultVersion::with_value("8.14.6")).unwrap();

        assert_eq!(spec.annotations.get("team").map(String::as_str), Some("platform"));
        assert_eq!(
            spec.annotations
                .get("kubeturbo.io/controllable")
                .map(String::as_str),
            Some("false")
        );
    }

    #[test]
    fn test_null_namespace_patterns_are_seeded() {
        let mut spec = spec_from(serde_json::json!({
            "systemWorkloadDetectors": { "namespacePatterns": null }
        }));
        apply_defaults(&mut spec, &DefaultVersion::with_value("8.14.6")).unwrap();

        assert_eq!(
            spec.system_workload_detectors.namespace_patterns,
            Some(vec![
                "kube-.*".to_string(),
                "openshift-.*".to_string(),
                "cattle.*".to_string()
            ])
        );
    }

    #[test]
    fn test_every_missing_field_is_named() {
        let mut spec = spec_from(serde_json::json!({
            "roleName": "",
            "serviceAccountName": "",
            "HANodeConfig": { "nodeRoles": "" }
        }));
        let err = apply_defaults(&mut spec, &DefaultVersion::with_value("8.14.6")).unwrap_err();

        assert_eq!(
            err,
            DefaultsError::MissingFields(vec![
                "Spec.RoleName",
                "Spec.ServiceAccountName",
                "Spec.HANodeConfig.NodeRoles",
            ])
        );
        assert!(err.to_string().contains(
            "missing critical field(s): Spec.RoleName, Spec.ServiceAccountName, Spec.HANodeConfig.NodeRoles."
        ));
    }

    #[test]
    fn test_default_version_is_single_assignment() {
        let version = DefaultVersion::new();
        version.set("8.14.6").unwrap();
        assert_eq!(
            version.set("9.0.0"),
            Err(DefaultsError::AlreadySet("8.14.6".to_string()))
        );
        assert_eq!(version.get(), Some("8.14.6"));
    }
}
