// Static YAML inventory parser

use std::path::Path;

use serde::Deserialize;
use serde_yaml::{Mapping, Value as YamlValue};

use super::{Inventory, ROOT_GROUP};
use crate::output::errors::StagehandError;

/// Connection fields a document may set for a host; `None` means "not set here"
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostParams {
    pub ip: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub sudo_password: Option<String>,
    pub key_path: Option<String>,
    pub port: Option<u16>,
    /// Seconds; fractional values are allowed
    pub timeout: Option<f64>,
}

impl Inventory {
    /// Parse inventory from a YAML string
    pub fn parse_str(content: &str) -> Result<Self, StagehandError> {
        let mut inv = Inventory::new();
        inv.merge_str(content, None)?;
        Ok(inv)
    }

    /// Merge a YAML document into this inventory
    ///
    /// Documents without a top-level `all` key are treated as `all: {children: <doc>}`.
    pub fn merge_str(
        &mut self,
        content: &str,
        source: Option<&Path>,
    ) -> Result<(), StagehandError> {
        let yaml: YamlValue = serde_yaml::from_str(content).map_err(|e| {
            StagehandError::parse(
                source.map(Path::to_path_buf),
                format!("invalid inventory YAML: {}", e),
            )
        })?;

        let doc = match yaml {
            YamlValue::Null => Mapping::new(),
            YamlValue::Mapping(map) => map,
            _ => {
                return Err(StagehandError::parse(
                    source.map(Path::to_path_buf),
                    "inventory must be a YAML mapping",
                ))
            }
        };

        let mut parser = GroupParser {
            inventory: self,
            source,
        };

        if doc.contains_key(ROOT_GROUP) {
            for (key, value) in &doc {
                let name = parser.key_name(key, "group")?;
                parser.parse_group(&name, value)?;
            }
        } else {
            let mut root = Mapping::new();
            root.insert(YamlValue::from("children"), YamlValue::Mapping(doc));
            parser.parse_group(ROOT_GROUP, &YamlValue::Mapping(root))?;
        }

        Ok(())
    }
}

struct GroupParser<'a> {
    inventory: &'a mut Inventory,
    source: Option<&'a Path>,
}

impl GroupParser<'_> {
    fn error(&self, message: impl Into<String>) -> StagehandError {
        StagehandError::parse(self.source.map(Path::to_path_buf), message)
    }

    /// Attribute a host-level parse error to the document being read
    fn locate(&self, err: StagehandError) -> StagehandError {
        match err {
            StagehandError::Parse { file: None, message } => self.error(message),
            other => other,
        }
    }

    fn key_name(&self, key: &YamlValue, what: &str) -> Result<String, StagehandError> {
        match key {
            YamlValue::String(s) => Ok(s.clone()),
            YamlValue::Number(n) => Ok(n.to_string()),
            other => Err(self.error(format!("{} name must be a string, got {:?}", what, other))),
        }
    }

    fn section<'v>(
        &self,
        value: &'v YamlValue,
        field: &str,
        group: &str,
    ) -> Result<Option<&'v Mapping>, StagehandError> {
        match value.get(field) {
            None | Some(YamlValue::Null) => Ok(None),
            Some(YamlValue::Mapping(map)) => Ok(Some(map)),
            Some(_) => Err(self.error(format!("group '{}': '{}' must be a mapping", group, field))),
        }
    }

    /// Register a group's own hosts, then its children, appending each child's
    /// flattened membership to this group.
    fn parse_group(&mut self, group: &str, value: &YamlValue) -> Result<(), StagehandError> {
        if !matches!(value, YamlValue::Mapping(_) | YamlValue::Null) {
            return Err(self.error(format!("group '{}' must be a mapping", group)));
        }
        self.inventory.ensure_group(group);

        if let Some(hosts) = self.section(value, "hosts", group)? {
            for (key, params) in hosts {
                let name = self.key_name(key, "host")?;
                let params: HostParams = match params {
                    YamlValue::Null => HostParams::default(),
                    other => serde_yaml::from_value(other.clone()).map_err(|e| {
                        self.error(format!("host '{}': {}", name, e))
                    })?,
                };
                self.inventory
                    .upsert_host(&name, &params)
                    .map_err(|e| self.locate(e))?;
                self.inventory.add_member(group, &name);
            }
        }

        if let Some(children) = self.section(value, "children", group)? {
            for (key, body) in children {
                let child = self.key_name(key, "group")?;
                if body.is_null() {
                    self.inventory.ensure_group(&child);
                } else {
                    self.parse_group(&child, body)?;
                }

                let members = self
                    .inventory
                    .group_members(&child)
                    .map(|m| m.to_vec())
                    .unwrap_or_default();
                for member in members {
                    self.inventory.add_member(group, &member);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn names(inv: &Inventory, target: &str) -> Vec<String> {
        inv.resolve(target)
            .unwrap()
            .into_iter()
            .map(|h| h.name)
            .collect()
    }

    #[test]
    fn test_parse_nested_groups() {
        let yaml = r#"
all:
  children:
    prod:
      children:
        web:
          hosts:
            web1:
              ip: 192.168.1.10
            web2:
              ip: 192.168.1.11
        db:
          hosts:
            db1:
              ip: 192.168.1.20
              port: 2222
"#;

        let inv = Inventory::parse_str(yaml).unwrap();
        assert_eq!(inv.host_count(), 3);
        assert_eq!(names(&inv, "web"), vec!["web1", "web2"]);
        assert_eq!(names(&inv, "prod"), vec!["web1", "web2", "db1"]);
        assert_eq!(names(&inv, "all"), vec!["web1", "web2", "db1"]);
        assert_eq!(inv.host("db1").unwrap().port, 2222);
        assert!(inv.is_group("prod"));
        assert!(!inv.is_group("web1"));
    }

    #[test]
    fn test_document_without_root_is_wrapped() {
        let yaml = r#"
web:
  hosts:
    a:
    b:
      ip: 10.0.0.2
"#;

        let inv = Inventory::parse_str(yaml).unwrap();
        assert_eq!(names(&inv, "web"), vec!["a", "b"]);
        assert_eq!(names(&inv, "all"), vec!["a", "b"]);
        assert_eq!(inv.host("a").unwrap().ip, "a");
        assert_eq!(inv.host("b").unwrap().ip, "10.0.0.2");
    }

    #[test]
    fn test_null_child_propagates_existing_membership() {
        let yaml = r#"
all:
  children:
    web:
      hosts:
        web1:
    frontend:
      children:
        web:
        edge:
"#;

        let inv = Inventory::parse_str(yaml).unwrap();
        assert_eq!(names(&inv, "frontend"), vec!["web1"]);
        assert!(inv.is_group("edge"));
        assert!(names(&inv, "edge").is_empty());
    }

    #[test]
    fn test_later_documents_merge_per_field() {
        let first = r#"
web:
  hosts:
    web1:
      ip: 10.0.0.1
      username: deploy
      timeout: 5
"#;
        let second = r#"
db:
  hosts:
    web1:
      ip: 10.0.0.99
      password: hunter2
"#;

        let mut inv = Inventory::parse_str(first).unwrap();
        inv.merge_str(second, None).unwrap();

        let host = inv.host("web1").unwrap();
        assert_eq!(host.ip, "10.0.0.99");
        assert_eq!(host.username.as_deref(), Some("deploy"));
        assert_eq!(host.password.as_deref(), Some("hunter2"));
        assert_eq!(host.timeout, Duration::from_secs(5));
        assert_eq!(inv.host_count(), 1);
        assert_eq!(names(&inv, "web"), vec!["web1"]);
        assert_eq!(names(&inv, "db"), vec!["web1"]);
    }

    #[test]
    fn test_load_multiple_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.yml");
        let b = dir.path().join("b.yml");
        std::fs::write(&a, "web:\n  hosts:\n    w1:\n").unwrap();
        std::fs::write(&b, "db:\n  hosts:\n    d1:\n").unwrap();

        let inv = Inventory::load(&[a, b]).unwrap();
        assert_eq!(names(&inv, "all"), vec!["w1", "d1"]);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = Inventory::load(&["/definitely/not/here.yml"]).unwrap_err();
        assert!(matches!(err, StagehandError::Io { .. }));
    }

    #[test]
    fn test_invalid_shapes_are_rejected() {
        assert!(Inventory::parse_str("- a\n- b\n").is_err());
        assert!(Inventory::parse_str("web:\n  hosts: [a, b]\n").is_err());
        assert!(Inventory::parse_str("web:\n  hosts:\n    a:\n      port: nope\n").is_err());
    }

    #[test]
    fn test_out_of_range_timeout_is_rejected() {
        for timeout in [".inf", "1e300", "-5", ".nan"] {
            let yaml = format!("web:\n  hosts:\n    a:\n      timeout: {}\n", timeout);
            let err = Inventory::parse_str(&yaml).unwrap_err();
            assert!(
                matches!(err, StagehandError::Parse { .. }),
                "{}: {:?}",
                timeout,
                err
            );
            assert!(err.to_string().contains("host 'a'"), "{}", err);
        }

        let inv = Inventory::parse_str("web:\n  hosts:\n    a:\n      timeout: 2.5\n").unwrap();
        assert_eq!(inv.host("a").unwrap().timeout, Duration::from_millis(2500));
    }

    #[test]
    fn test_every_group_host_reachable_from_ancestors() {
        let yaml = r#"
all:
  children:
    dc:
      children:
        rack1:
          children:
            shelf:
              hosts:
                s1:
                s2:
          hosts:
            r1:
"#;

        let inv = Inventory::parse_str(yaml).unwrap();
        for ancestor in ["shelf", "rack1", "dc", "all"] {
            let members = names(&inv, ancestor);
            assert!(members.contains(&"s1".to_string()), "{} lacks s1", ancestor);
            assert!(members.contains(&"s2".to_string()), "{} lacks s2", ancestor);
        }
        assert!(names(&inv, "rack1").contains(&"r1".to_string()));
    }
}
