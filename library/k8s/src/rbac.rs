use crate::errors::ApiError;
use error::*;
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use kube::api::{Api, ObjectMeta, PostParams};
use kube::error::ErrorResponse;
use result::Result;

/// Idempotently ensures the `user-{username}-role` / `user-{username}-binding`
/// pair described in §4.8's RBAC bootstrap: the named user gets
/// `get,list,watch,create,delete,patch,update` on pods and their
/// log/exec/attach/portforward subresources; `get,list,watch,create,delete`
/// on pvcs and services; `get,list,watch` on configmaps, secrets, events.
pub async fn ensure_user_rbac<NS: AsRef<str>, U: AsRef<str>>(namespace: NS, username: U) -> Result<()> {
    let namespace = namespace.as_ref();
    let username = username.as_ref();
    let role_name = format!("user-{}-role", username);
    let binding_name = format!("user-{}-binding", username);

    let rules = vec![
        PolicyRule {
            api_groups: Some(vec!["".to_string()]),
            resources: Some(vec![
                "pods".to_string(),
                "pods/log".to_string(),
                "pods/exec".to_string(),
                "pods/attach".to_string(),
                "pods/portforward".to_string(),
            ]),
            verbs: vec![
                "get", "list", "watch", "create", "delete", "patch", "update",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            ..Default::default()
        },
        PolicyRule {
            api_groups: Some(vec!["".to_string()]),
            resources: Some(vec!["persistentvolumeclaims".to_string(), "services".to_string()]),
            verbs: vec!["get", "list", "watch", "create", "delete"]
                .into_iter()
                .map(String::from)
                .collect(),
            ..Default::default()
        },
        PolicyRule {
            api_groups: Some(vec!["".to_string()]),
            resources: Some(vec![
                "configmaps".to_string(),
                "secrets".to_string(),
                "events".to_string(),
            ]),
            verbs: vec!["get", "list", "watch"].into_iter().map(String::from).collect(),
            ..Default::default()
        },
    ];

    let role = Role {
        metadata: ObjectMeta {
            name: Some(role_name.clone()),
            ..Default::default()
        },
        rules: Some(rules),
    };
    let roles: Api<Role> = crate::client::namespaced(namespace).await;
    if let Err(err) = roles.create(&PostParams::default(), &role).await {
        match err {
            kube::Error::Api(ErrorResponse { code: 409, .. }) => {}
            err => return Err(ApiError::from(err).into()),
        }
    }

    let binding = RoleBinding {
        metadata: ObjectMeta {
            name: Some(binding_name.clone()),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: role_name,
        },
        subjects: Some(vec![Subject {
            kind: "User".to_string(),
            name: username.to_string(),
            api_group: Some("rbac.authorization.k8s.io".to_string()),
            namespace: None,
        }]),
    };
    let bindings: Api<RoleBinding> = crate::client::namespaced(namespace).await;
    match bindings.create(&PostParams::default(), &binding).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ErrorResponse { code: 409, .. })) => Ok(()),
        Err(err) => Err(ApiError::from(err).into()),
    }
}
