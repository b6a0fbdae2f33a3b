//! Robots.txt parsing and path matching.
//!
//! Groups are matched by user-agent token; within a group the longest
//! matching rule wins and `Allow` wins ties. `*` and a trailing `$` are
//! supported in rule paths.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
enum Rule {
    Allow(String),
    Disallow(String),
}

impl Rule {
    fn pattern(&self) -> &str {
        match self {
            Rule::Allow(p) | Rule::Disallow(p) => p,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Group {
    /// Lowercased user-agent tokens
    agents: Vec<String>,
    rules: Vec<Rule>,
    crawl_delay: Option<f64>,
}

/// Parsed robots.txt.
#[derive(Debug, Clone, Default)]
pub struct RobotsTxt {
    groups: Vec<Group>,
}

impl RobotsTxt {
    pub fn parse(content: &str) -> Self {
        let mut groups: Vec<Group> = Vec::new();
        let mut current = Group::default();
        // Consecutive user-agent lines share one group
        let mut collecting_agents = false;

        for raw in content.lines() {
            let line = raw.split('#').next().unwrap_or("").trim();
            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            match directive.trim().to_ascii_lowercase().as_str() {
                "user-agent" => {
                    if !collecting_agents && !current.agents.is_empty() {
                        groups.push(std::mem::take(&mut current));
                    }
                    current.agents.push(value.to_ascii_lowercase());
                    collecting_agents = true;
                }
                "allow" if !value.is_empty() => {
                    current.rules.push(Rule::Allow(value.to_string()));
                    collecting_agents = false;
                }
                "disallow" => {
                    // An empty Disallow allows everything
                    if !value.is_empty() {
                        current.rules.push(Rule::Disallow(value.to_string()));
                    }
                    collecting_agents = false;
                }
                "crawl-delay" => {
                    current.crawl_delay = value.parse::<f64>().ok().filter(|d| *d >= 0.0);
                    collecting_agents = false;
                }
                _ => {}
            }
        }

        if !current.agents.is_empty() {
            groups.push(current);
        }

        Self { groups }
    }

    /// The group for `user_agent`, falling back to `*`.
    fn group_for(&self, user_agent: &str) -> Option<&Group> {
        let agent = user_agent.to_ascii_lowercase();
        self.groups
            .iter()
            .filter(|g| g.agents.iter().any(|a| a != "*" && agent.contains(a.as_str())))
            .max_by_key(|g| g.agents.iter().map(String::len).max().unwrap_or(0))
            .or_else(|| self.groups.iter().find(|g| g.agents.iter().any(|a| a == "*")))
    }

    /// Whether `path` (path plus optional query) may be fetched.
    pub fn is_allowed(&self, user_agent: &str, path: &str) -> bool {
        let Some(group) = self.group_for(user_agent) else {
            return true;
        };

        let best = group
            .rules
            .iter()
            .filter(|r| path_matches(r.pattern(), path))
            .max_by(|a, b| {
                a.pattern()
                    .len()
                    .cmp(&b.pattern().len())
                    .then_with(|| matches!(a, Rule::Allow(_)).cmp(&matches!(b, Rule::Allow(_))))
            });

        !matches!(best, Some(Rule::Disallow(_)))
    }

    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        self.group_for(user_agent)
            .and_then(|g| g.crawl_delay)
            .map(Duration::from_secs_f64)
    }
}

/// Match a robots.txt path pattern (`*` wildcard, `$` end anchor).
fn path_matches(pattern: &str, path: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };

    let mut parts = pattern.split('*');
    let first = parts.next().unwrap_or("");
    if !path.starts_with(first) {
        return false;
    }
    let mut rest = &path[first.len()..];

    let remaining: Vec<&str> = parts.collect();
    for (i, part) in remaining.iter().enumerate() {
        let is_last = i + 1 == remaining.len();
        if is_last && anchored {
            return rest.ends_with(part);
        }
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }

    !anchored || rest.is_empty()
}
