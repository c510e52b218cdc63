//! Selector/condition rule language that maps tag sets onto presets.
//!
//! ```text
//! /* comment */
//! residential, office { building; -building:part; |amenity=townhall; @levels=4; kind: building }
//! ```
//!
//! Conditions are evaluated left to right without short circuiting: a failed
//! AND clears the match, a present AND-NOT tag clears it, and any satisfied
//! OR sets it again, even after an AND failure.

use std::collections::HashMap;

use regex::Regex;

use crate::data::osm::Tags;
use crate::data::scene::GeometryKind;
use crate::errors::{Error, Result};
use crate::presets::PresetIndex;

pub const DEFAULT_RULES: &str = r#"
/* Tag detection of the classic importer. */
building { building; }
road { highway; -area; }
cycleway { cycleway=track; -highway; }
railway { railway; -building; }
area { area; |natural; |landuse; |leisure; -building; }
barrier { barrier; -building; }
object { amenity; |shop; |office; |tourism; |historic; |emergency; |highway=traffic_signals; |highway=street_lamp; |railway=level_crossing; }
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    And,
    AndNot,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl Operator {
    fn from_symbol(symbol: &str) -> Option<Operator> {
        match symbol {
            "=" => Some(Operator::Eq),
            "!=" => Some(Operator::Ne),
            ">" => Some(Operator::Gt),
            "<" => Some(Operator::Lt),
            ">=" => Some(Operator::Ge),
            "<=" => Some(Operator::Le),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub property: String,
    /// `None` means the tag only has to be present.
    pub operator: Option<Operator>,
    pub value: String,
    pub combinator: Combinator,
}

impl Condition {
    /// Whether the tag predicate holds, ignoring the combinator.
    pub fn holds(&self, tags: &Tags) -> bool {
        let Some(value) = tags.get(&self.property) else {
            return false;
        };
        let Some(operator) = self.operator else {
            return true;
        };
        match operator {
            Operator::Eq => *value == self.value,
            Operator::Ne => *value != self.value,
            _ => {
                let (Ok(lhs), Ok(rhs)) = (value.trim().parse::<f64>(), self.value.parse::<f64>()) else {
                    return false;
                };
                match operator {
                    Operator::Gt => lhs > rhs,
                    Operator::Lt => lhs < rhs,
                    Operator::Ge => lhs >= rhs,
                    _ => lhs <= rhs,
                }
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rule {
    pub selector: Vec<String>,
    pub conditions: Vec<Condition>,
    /// Generation settings, e.g. `kind`, `levels`, `lanes`, `width`.
    pub settings: HashMap<String, String>,
}

impl Rule {
    pub fn matches(&self, tags: &Tags) -> bool {
        let mut matched = true;
        for condition in &self.conditions {
            match condition.combinator {
                Combinator::And => {
                    if !condition.holds(tags) {
                        matched = false;
                    }
                },
                Combinator::AndNot => {
                    if tags.contains_key(&condition.property) {
                        matched = false;
                    }
                },
                Combinator::Or => {
                    if condition.holds(tags) {
                        matched = true;
                    }
                },
            }
        }
        matched
    }

    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }

    pub fn setting_f64(&self, key: &str) -> Option<f64> {
        self.setting(key)?.parse().ok()
    }

    /// Geometry kind forced by the rule, overriding the preset's own kind.
    pub fn kind(&self) -> Option<GeometryKind> {
        self.setting("kind")
            .or_else(|| self.setting("type"))
            .and_then(GeometryKind::from_name)
    }
}

/// A rule that matched an entity, together with the preset it instantiates.
#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    pub rule: usize,
    pub preset: String,
}

struct Grammar {
    comment: Regex,
    condition: Regex,
    setting: Regex,
}

impl Grammar {
    fn new() -> Result<Self> {
        Ok(Grammar {
            comment: Regex::new(r"(?s)/\*.*?\*/")?,
            condition: Regex::new(
                r"^(?P<comb>[-|+]?)\s*(?P<at>@?)(?P<name>[^=!<>\s]+)\s*(?:(?P<op>!=|>=|<=|=|>|<)\s*(?P<value>.*?))?\s*$",
            )?,
            setting: Regex::new(r"^(?P<name>[A-Za-z_][\w\-]*)\s*:\s+(?P<value>\S.*?)\s*$")?,
        })
    }

    fn parse_rule(&self, selector: &str, body: &str) -> Result<Rule> {
        let selector: Vec<String> = selector.split(',')
            .map(|name| name.trim().to_string())
            .collect();
        if selector.iter().any(String::is_empty) {
            return Err(Error::parse(format!("empty name in selector {:?}", selector.join(","))));
        }

        let mut rule = Rule {
            selector,
            ..Default::default()
        };
        for item in body.split(';').map(str::trim).filter(|item| !item.is_empty()) {
            if let Some(caps) = self.setting.captures(item) {
                rule.settings.insert(caps["name"].to_string(), caps["value"].to_string());
                continue;
            }
            let caps = self.condition.captures(item)
                .ok_or_else(|| Error::parse(format!("malformed condition {:?}", item)))?;

            let combinator = match &caps["comb"] {
                "-" => Combinator::AndNot,
                "|" => Combinator::Or,
                _ => Combinator::And,
            };
            let operator = caps.name("op").and_then(|op| Operator::from_symbol(op.as_str()));
            let value = caps.name("value").map(|v| v.as_str().to_string()).unwrap_or_default();

            if &caps["at"] == "@" {
                if operator != Some(Operator::Eq) || combinator != Combinator::And {
                    return Err(Error::parse(format!("setting must be `@name=value`: {:?}", item)));
                }
                rule.settings.insert(caps["name"].to_string(), value);
            } else {
                rule.conditions.push(Condition {
                    property: caps["name"].to_string(),
                    operator,
                    value,
                    combinator,
                });
            }
        }
        Ok(rule)
    }
}

fn snippet(text: &str) -> String {
    text.chars().take(40).collect()
}

#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    /// Selector names in first declaration order, each with its rules in order.
    by_selector: Vec<(String, Vec<usize>)>,
}

impl RuleSet {
    /// Parses rule source. Any malformed rule fails the whole source.
    pub fn parse(source: &str) -> Result<RuleSet> {
        let grammar = Grammar::new()?;
        let text = grammar.comment.replace_all(source, "");

        let mut rules = Vec::new();
        let mut rest = text.trim();
        while !rest.is_empty() {
            let open = rest.find('{')
                .ok_or_else(|| Error::parse(format!("rule without '{{': {:?}", snippet(rest))))?;
            let close = rest.find('}')
                .ok_or_else(|| Error::parse(format!("rule without '}}': {:?}", snippet(rest))))?;
            if close < open {
                return Err(Error::parse(format!("unexpected '}}' near {:?}", snippet(rest))));
            }
            let body = &rest[open + 1..close];
            if body.contains('{') {
                return Err(Error::parse(format!("nested '{{' near {:?}", snippet(rest))));
            }
            rules.push(grammar.parse_rule(&rest[..open], body)?);
            rest = rest[close + 1..].trim_start();
        }

        Ok(RuleSet::new(rules))
    }

    pub fn new(rules: Vec<Rule>) -> RuleSet {
        let mut by_selector: Vec<(String, Vec<usize>)> = Vec::new();
        for (idx, rule) in rules.iter().enumerate() {
            for name in &rule.selector {
                match by_selector.iter_mut().find(|(selector, _)| selector == name) {
                    Some((_, indices)) => indices.push(idx),
                    None => by_selector.push((name.clone(), vec![idx])),
                }
            }
        }
        RuleSet { rules, by_selector }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule(&self, idx: usize) -> &Rule {
        &self.rules[idx]
    }

    /// Selector names that have no preset in `presets`.
    pub fn unknown_presets<'a>(&'a self, presets: &PresetIndex) -> Vec<&'a str> {
        self.by_selector.iter()
            .map(|(name, _)| name.as_str())
            .filter(|name| !presets.contains(name))
            .collect()
    }

    /// Ordered (rule, preset) matches for a tag set. Selectors without a preset
    /// are skipped. An empty result means no rule matched.
    pub fn classify(&self, tags: &Tags, presets: &PresetIndex) -> Vec<RuleMatch> {
        let mut matches = Vec::new();
        for (selector, indices) in &self.by_selector {
            if !presets.contains(selector) {
                continue;
            }
            for idx in indices {
                if self.rules[*idx].matches(tags) {
                    matches.push(RuleMatch {
                        rule: *idx,
                        preset: selector.clone(),
                    });
                }
            }
        }
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presets::Preset;

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn presets(ids: &[&str]) -> PresetIndex {
        PresetIndex::new(
            ids.iter().map(|id| Preset::new(id, GeometryKind::Building)).collect()
        ).unwrap()
    }

    #[test]
    fn parses_conditions_and_settings() {
        let rules = RuleSet::parse(
            "/* offices */ office, tower { building=office; -building:part; |height>=50; @levels=4; kind: building }"
        ).unwrap();
        let rule = rules.rule(0);
        assert_eq!(rule.selector, vec!["office", "tower"]);
        assert_eq!(rule.conditions.len(), 3);

        assert_eq!(rule.conditions[0].property, "building");
        assert_eq!(rule.conditions[0].operator, Some(Operator::Eq));
        assert_eq!(rule.conditions[0].value, "office");
        assert_eq!(rule.conditions[0].combinator, Combinator::And);

        assert_eq!(rule.conditions[1].property, "building:part");
        assert_eq!(rule.conditions[1].operator, None);
        assert_eq!(rule.conditions[1].combinator, Combinator::AndNot);

        assert_eq!(rule.conditions[2].operator, Some(Operator::Ge));
        assert_eq!(rule.conditions[2].value, "50");
        assert_eq!(rule.conditions[2].combinator, Combinator::Or);

        assert_eq!(rule.setting("levels"), Some("4"));
        assert_eq!(rule.setting_f64("levels"), Some(4.0));
        assert_eq!(rule.kind(), Some(GeometryKind::Building));
    }

    #[test]
    fn two_character_operators_win() {
        let rules = RuleSet::parse("a { lanes!=2; width<=4; +layer<1 }").unwrap();
        let ops: Vec<Option<Operator>> = rules.rule(0).conditions.iter().map(|c| c.operator).collect();
        assert_eq!(ops, vec![Some(Operator::Ne), Some(Operator::Le), Some(Operator::Lt)]);
    }

    #[test]
    fn malformed_source_is_rejected() {
        assert!(RuleSet::parse("building { building; ").is_err());
        assert!(RuleSet::parse("building building; }").is_err());
        assert!(RuleSet::parse("a, { building }").is_err());
        assert!(RuleSet::parse("a { b { c } }").is_err());
        assert!(RuleSet::parse("a { height >= }").is_ok());
        assert!(RuleSet::parse("a { two words }").is_err());
        assert!(RuleSet::parse("a { @levels>3 }").is_err());
        assert!(RuleSet::parse("  /* only a comment */ ").unwrap().rules().is_empty());
    }

    #[test]
    fn and_failure_is_sticky() {
        let rules = RuleSet::parse("a { building; height>10 }").unwrap();
        let rule = rules.rule(0);
        assert!(rule.matches(&tags(&[("building", "yes"), ("height", "12")])));
        assert!(!rule.matches(&tags(&[("building", "yes"), ("height", "8")])));
        assert!(!rule.matches(&tags(&[("height", "12")])));
        assert!(!rule.matches(&tags(&[("building", "yes"), ("height", "tall")])));
    }

    #[test]
    fn or_rescues_failed_and() {
        let rules = RuleSet::parse("a { building=house; |amenity }").unwrap();
        let rule = rules.rule(0);
        assert!(rule.matches(&tags(&[("building", "house")])));
        assert!(rule.matches(&tags(&[("building", "office"), ("amenity", "school")])));
        assert!(!rule.matches(&tags(&[("building", "office")])));
    }

    #[test]
    fn and_not_checks_presence_only() {
        let rules = RuleSet::parse("a { highway; -area=no }").unwrap();
        let rule = rules.rule(0);
        assert!(rule.matches(&tags(&[("highway", "primary")])));
        assert!(!rule.matches(&tags(&[("highway", "primary"), ("area", "yes")])));
    }

    #[test]
    fn and_not_after_or_still_clears() {
        let rules = RuleSet::parse("a { area; |natural; -building }").unwrap();
        let rule = rules.rule(0);
        assert!(rule.matches(&tags(&[("natural", "wood")])));
        assert!(!rule.matches(&tags(&[("natural", "wood"), ("building", "yes")])));
    }

    #[test]
    fn matches_follow_selector_declaration_order() {
        let rules = RuleSet::parse("a, b { building } b { building=yes } a { height } c { building }").unwrap();
        let index = presets(&["a", "b"]);
        let found = rules.classify(&tags(&[("building", "yes"), ("height", "3")]), &index);
        let pairs: Vec<(usize, &str)> = found.iter().map(|m| (m.rule, m.preset.as_str())).collect();
        assert_eq!(pairs, vec![(0, "a"), (2, "a"), (0, "b"), (1, "b")]);
        assert_eq!(rules.unknown_presets(&index), vec!["c"]);
    }

    #[test]
    fn classification_is_deterministic() {
        let source = "x { building } y { building; |shop } x { shop }";
        let index = presets(&["x", "y"]);
        let input = tags(&[("building", "yes"), ("shop", "bakery"), ("name", "Bakery")]);
        let first = RuleSet::parse(source).unwrap().classify(&input, &index);
        for _ in 0..10 {
            assert_eq!(RuleSet::parse(source).unwrap().classify(&input, &index), first);
        }
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn and_not_only_rules_match_untagged_entities() {
        let rules = RuleSet::parse("a { -building }").unwrap();
        let found = rules.classify(&Tags::new(), &presets(&["a"]));
        assert_eq!(found, vec![RuleMatch { rule: 0, preset: "a".into() }]);
        assert!(rules.classify(&tags(&[("building", "yes")]), &presets(&["a"])).is_empty());

        let defaults = RuleSet::parse(DEFAULT_RULES).unwrap();
        assert!(defaults.classify(&Tags::new(), &PresetIndex::builtin()).is_empty());
    }

    #[test]
    fn default_rules_parse() {
        let rules = RuleSet::parse(DEFAULT_RULES).unwrap();
        assert!(rules.unknown_presets(&PresetIndex::builtin()).is_empty());
        let found = rules.classify(&tags(&[("highway", "residential")]), &PresetIndex::builtin());
        assert_eq!(found, vec![RuleMatch { rule: 1, preset: "road".into() }]);
    }
}
