//! Manifest for a freshly created proxy Deployment.

use std::collections::BTreeMap;

use super::session::{RunId, SESSION_LABEL_KEY};

/// Fixed-shape proxy Deployment, rendered as YAML for `kubectl create -f -`.
#[derive(Debug, Clone)]
pub struct DeploymentManifest<'a> {
    pub name: &'a str,
    pub run_id: &'a RunId,
    pub image: &'a str,
    pub service_account: Option<&'a str>,
    pub env: &'a BTreeMap<String, String>,
    pub annotations: &'a BTreeMap<String, String>,
    pub labels: &'a BTreeMap<String, String>,
}

impl DeploymentManifest<'_> {
    pub fn render(&self) -> String {
        let run_id = quote(self.run_id.as_str());
        let name = quote(self.name);
        let label = format!("{}: {}", SESSION_LABEL_KEY, run_id);

        let annotations = block(
            "      annotations:\n",
            self.annotations
                .iter()
                .map(|(key, value)| format!("        {}: {}\n", quote(key), quote(value))),
        );
        let extra_labels: String = self
            .labels
            .iter()
            .filter(|(key, _)| key.as_str() != SESSION_LABEL_KEY)
            .map(|(key, value)| format!("        {}: {}\n", quote(key), quote(value)))
            .collect();
        let service_account = self
            .service_account
            .filter(|account| !account.is_empty())
            .map(|account| format!("      serviceAccountName: {}\n", quote(account)))
            .unwrap_or_default();
        let env = block(
            "        env:\n",
            self.env.iter().map(|(key, value)| {
                format!(
                    "        - name: {}\n          value: {}\n",
                    quote(key),
                    quote(value)
                )
            }),
        );

        format!(
            r#"apiVersion: apps/v1
kind: Deployment
metadata:
  labels:
    {label}
  name: {name}
spec:
  replicas: 1
  selector:
    matchLabels:
      {label}
  template:
    metadata:
{annotations}      labels:
{extra_labels}        {label}
    spec:
{service_account}      containers:
      - name: {name}
        image: {image}
{env}        resources:
          limits:
            cpu: "1"
            memory: 256Mi
          requests:
            cpu: 25m
            memory: 64Mi
"#,
            image = quote(self.image),
        )
    }
}

/// `header` followed by `lines`, or nothing when there are no lines.
fn block(header: &str, lines: impl Iterator<Item = String>) -> String {
    let body: String = lines.collect();
    if body.is_empty() {
        body
    } else {
        format!("{}{}", header, body)
    }
}

/// Double-quoted scalar; JSON string syntax is valid YAML.
fn quote(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_manifest() {
        let run_id: RunId = "abc123".parse().unwrap();
        let empty = BTreeMap::new();
        let yaml = DeploymentManifest {
            name: "svc-a",
            run_id: &run_id,
            image: "docker.io/kubetunnel/proxy-k8s:0.1.0",
            service_account: None,
            env: &empty,
            annotations: &empty,
            labels: &empty,
        }
        .render();

        assert!(yaml.contains("  name: \"svc-a\"\n"));
        assert!(yaml.contains("  replicas: 1\n"));
        assert!(yaml.contains("      kubetunnel: \"abc123\"\n"));
        assert!(yaml.contains("        image: \"docker.io/kubetunnel/proxy-k8s:0.1.0\"\n"));
        assert!(!yaml.contains("annotations:"));
        assert!(!yaml.contains("env:"));
        assert!(!yaml.contains("serviceAccountName"));
        assert_eq!(yaml.matches("- name:").count(), 1);
    }

    #[test]
    fn test_optional_blocks() {
        let run_id: RunId = "abc123".parse().unwrap();
        let env = BTreeMap::from([("KUBETUNNEL_NAMESERVER".to_string(), "10.0.0.10".to_string())]);
        let annotations =
            BTreeMap::from([("sidecar.istio.io/inject".to_string(), "false".to_string())]);
        let labels = BTreeMap::from([("team".to_string(), "payments".to_string())]);

        let yaml = DeploymentManifest {
            name: "svc-a",
            run_id: &run_id,
            image: "img",
            service_account: Some("proxy"),
            env: &env,
            annotations: &annotations,
            labels: &labels,
        }
        .render();

        assert!(yaml.contains(
            "      annotations:\n        \"sidecar.istio.io/inject\": \"false\"\n      labels:\n"
        ));
        assert!(yaml.contains("        \"team\": \"payments\"\n        kubetunnel: \"abc123\"\n"));
        assert!(yaml.contains("      serviceAccountName: \"proxy\"\n"));
        assert!(yaml.contains(
            "        env:\n        - name: \"KUBETUNNEL_NAMESERVER\"\n          value: \"10.0.0.10\"\n"
        ));
    }
}
