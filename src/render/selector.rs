//! 选择器：复合选择器 + 后代组合
//!
//! 支持 `tag`、`*`、`#id`、`.class`、`[attr]`、`[attr=value]`（值可加引号），
//! 复合选择器之间用空白表示后代关系，例如 `ul.addresses li[data-addr]`。

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::core::ComponentError;

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?P<ws>\s+)|(?P<star>\*)|(?P<tag>[A-Za-z][\w-]*)|#(?P<id>[\w-]+)|\.(?P<class>[\w-]+)|\[\s*(?P<attr>[\w-]+)\s*(?:=\s*(?P<value>"[^"]*"|'[^']*'|[^\]\s"']+)\s*)?\]"#,
        )
        .expect("selector token regex is valid")
    })
}

/// 单个复合选择器
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Compound {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attributes: Vec<(String, Option<String>)>,
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none() && self.id.is_none() && self.classes.is_empty() && self.attributes.is_empty()
    }

    /// 元素（标签 + 属性表）是否满足本复合选择器
    pub fn matches(&self, tag: &str, attributes: &BTreeMap<String, String>) -> bool {
        if let Some(t) = &self.tag {
            if t != "*" && !t.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if attributes.get("id") != Some(id) {
                return false;
            }
        }
        if !self.classes.is_empty() {
            let classes: Vec<&str> = attributes
                .get("class")
                .map(|c| c.split_whitespace().collect())
                .unwrap_or_default();
            if !self.classes.iter().all(|c| classes.contains(&c.as_str())) {
                return false;
            }
        }
        self.attributes.iter().all(|(name, expected)| match (attributes.get(name), expected) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(actual), Some(expected)) => actual == expected,
        })
    }
}

/// 解析后的选择器：祖先在前，最后一个复合选择器对应目标元素本身
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    source: String,
    compounds: Vec<Compound>,
}

impl Selector {
    pub fn parse(source: &str) -> Result<Self, ComponentError> {
        let invalid = |reason: &str| ComponentError::InvalidSelector {
            selector: source.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty selector"));
        }

        let mut compounds = Vec::new();
        let mut current = Compound::default();
        let mut pos = 0;
        for caps in token_regex().captures_iter(trimmed) {
            let whole = caps.get(0).ok_or_else(|| invalid("unexpected token"))?;
            if whole.start() != pos {
                return Err(invalid(&format!("unexpected character at {pos}")));
            }
            pos = whole.end();

            if caps.name("ws").is_some() {
                if !current.is_empty() {
                    compounds.push(std::mem::take(&mut current));
                }
            } else if let Some(tag) = caps.name("star").or_else(|| caps.name("tag")) {
                if !current.is_empty() {
                    return Err(invalid("type selector must start a compound"));
                }
                current.tag = Some(tag.as_str().to_ascii_lowercase());
            } else if let Some(id) = caps.name("id") {
                current.id = Some(id.as_str().to_string());
            } else if let Some(class) = caps.name("class") {
                current.classes.push(class.as_str().to_string());
            } else if let Some(attr) = caps.name("attr") {
                let value = caps
                    .name("value")
                    .map(|v| v.as_str().trim_matches(|c| c == '"' || c == '\'').to_string());
                current.attributes.push((attr.as_str().to_string(), value));
            }
        }

        if pos != trimmed.len() {
            return Err(invalid(&format!("unexpected character at {pos}")));
        }
        if !current.is_empty() {
            compounds.push(current);
        }

        Ok(Self {
            source: source.to_string(),
            compounds,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// 目标元素自身对应的复合选择器
    pub fn subject(&self) -> &Compound {
        // parse 保证至少有一个复合选择器
        &self.compounds[self.compounds.len() - 1]
    }

    /// 目标之前的祖先约束（由近到远）
    pub fn ancestors(&self) -> impl Iterator<Item = &Compound> {
        self.compounds[..self.compounds.len() - 1].iter().rev()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_parse_compound() {
        let sel = Selector::parse("li#first.addr.active[data-kind=\"ip4\"][hidden]").unwrap();
        let c = sel.subject();
        assert_eq!(c.tag.as_deref(), Some("li"));
        assert_eq!(c.id.as_deref(), Some("first"));
        assert_eq!(c.classes, vec!["addr", "active"]);
        assert_eq!(
            c.attributes,
            vec![("data-kind".to_string(), Some("ip4".to_string())), ("hidden".to_string(), None)]
        );
    }

    #[test]
    fn test_parse_descendant_chain() {
        let sel = Selector::parse("  ul.addresses   li ").unwrap();
        assert_eq!(sel.subject().tag.as_deref(), Some("li"));
        let ancestors: Vec<_> = sel.ancestors().collect();
        assert_eq!(ancestors.len(), 1);
        assert_eq!(ancestors[0].classes, vec!["addresses"]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Selector::parse("").is_err());
        assert!(Selector::parse("div > span").is_err());
        assert!(Selector::parse(".a div").is_ok());
        assert!(Selector::parse("#a div.b[").is_err());
    }

    #[test]
    fn test_compound_matches() {
        let sel = Selector::parse("button.primary[data-action=start]").unwrap();
        let yes = attrs(&[("class", "btn primary"), ("data-action", "start")]);
        let no = attrs(&[("class", "btn"), ("data-action", "start")]);
        assert!(sel.subject().matches("button", &yes));
        assert!(!sel.subject().matches("button", &no));
        assert!(!sel.subject().matches("a", &yes));
        assert!(Selector::parse("*").unwrap().subject().matches("span", &no));
    }
}
