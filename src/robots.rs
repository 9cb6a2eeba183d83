use crate::types::AiCrawlerPolicy;

/// User-agent tokens of the crawlers that feed AI answer engines.
pub const AI_CRAWLERS: &[&str] = &[
    "GPTBot",
    "ChatGPT-User",
    "OAI-SearchBot",
    "ClaudeBot",
    "anthropic-ai",
    "PerplexityBot",
    "Google-Extended",
    "CCBot",
];

#[derive(Debug, Clone, PartialEq, Eq)]
struct Rule {
    allow: bool,
    path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Group {
    agents: Vec<String>,
    rules: Vec<Rule>,
}

impl Group {
    fn names(&self, agent: &str) -> bool {
        self.agents.iter().any(|a| a.eq_ignore_ascii_case(agent))
    }

    /// Whether the site root is crawlable for this group. Only rules that
    /// cover `/` itself are considered; Allow wins a tie.
    fn allows_root(&self) -> bool {
        let mut verdict: Option<(usize, bool)> = None;
        for rule in &self.rules {
            let covers_root = match rule.path.as_str() {
                // "Disallow:" with no path allows everything
                "" => {
                    if !rule.allow {
                        continue;
                    }
                    true
                }
                "/" | "/*" | "*" => true,
                _ => false,
            };
            if !covers_root {
                continue;
            }
            let len = rule.path.len();
            verdict = match verdict {
                Some((l, a)) if l > len || (l == len && a) => Some((l, a)),
                _ => Some((len, rule.allow)),
            };
        }
        verdict.map(|(_, allow)| allow).unwrap_or(true)
    }
}

/// The parts of robots.txt this crate reads: agent groups and sitemap lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RobotsTxt {
    groups: Vec<Group>,
    pub sitemaps: Vec<String>,
}

pub fn parse_robots(text: &str) -> RobotsTxt {
    let mut robots = RobotsTxt::default();
    let mut current = Group::default();
    let mut in_rules = false;

    for raw in text.lines() {
        let line = raw.split('#').next().unwrap_or("").trim();
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();

        match key.as_str() {
            "user-agent" => {
                if in_rules {
                    robots.groups.push(std::mem::take(&mut current));
                    in_rules = false;
                }
                current.agents.push(value.to_string());
            }
            "allow" | "disallow" => {
                if current.agents.is_empty() {
                    continue;
                }
                in_rules = true;
                current.rules.push(Rule {
                    allow: key == "allow",
                    path: value.to_string(),
                });
            }
            "sitemap" => {
                if !value.is_empty() {
                    robots.sitemaps.push(value.to_string());
                }
            }
            _ => {}
        }
    }
    if !current.agents.is_empty() {
        robots.groups.push(current);
    }
    robots
}

impl RobotsTxt {
    /// Disallow on any named AI agent wins, then any named allow, then the
    /// wildcard group.
    pub fn ai_crawler_policy(&self) -> AiCrawlerPolicy {
        let mut named_allow = false;
        for agent in AI_CRAWLERS {
            for group in self.groups.iter().filter(|g| g.names(agent)) {
                if !group.allows_root() {
                    return AiCrawlerPolicy::Disallowed;
                }
                named_allow = true;
            }
        }
        if named_allow {
            return AiCrawlerPolicy::ExplicitlyAllowed;
        }
        if self
            .groups
            .iter()
            .filter(|g| g.names("*"))
            .any(|g| !g.allows_root())
        {
            return AiCrawlerPolicy::Disallowed;
        }
        AiCrawlerPolicy::NotMentioned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_allow() {
        let robots = parse_robots(
            "User-agent: GPTBot\nUser-agent: ClaudeBot\nAllow: /\n\nUser-agent: *\nDisallow: /admin\n",
        );
        assert_eq!(robots.ai_crawler_policy(), AiCrawlerPolicy::ExplicitlyAllowed);
    }

    #[test]
    fn test_named_disallow_wins() {
        let robots = parse_robots(
            "User-agent: GPTBot\nAllow: /\n\nUser-agent: CCBot\nDisallow: /\n",
        );
        assert_eq!(robots.ai_crawler_policy(), AiCrawlerPolicy::Disallowed);
    }

    #[test]
    fn test_wildcard_only() {
        let open = parse_robots("User-agent: *\nDisallow:\n");
        assert_eq!(open.ai_crawler_policy(), AiCrawlerPolicy::NotMentioned);

        let closed = parse_robots("User-agent: *\nDisallow: /\n");
        assert_eq!(closed.ai_crawler_policy(), AiCrawlerPolicy::Disallowed);
    }

    #[test]
    fn test_sitemap_lines_and_comments() {
        let robots = parse_robots(
            "# hello\nSitemap: https://example.com/sm.xml\nUser-agent: gptbot # lower case\nDisallow: /private\n",
        );
        assert_eq!(robots.sitemaps, vec!["https://example.com/sm.xml".to_string()]);
        // a path-scoped disallow still leaves the root open
        assert_eq!(robots.ai_crawler_policy(), AiCrawlerPolicy::ExplicitlyAllowed);
    }
}
