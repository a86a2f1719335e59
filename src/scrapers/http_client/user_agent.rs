//! User-Agent selection.

/// Identifies the crawler honestly; robots.txt groups match on `sitecrawl`.
pub const USER_AGENT: &str = concat!(
    "sitecrawl/",
    env!("CARGO_PKG_VERSION"),
    " (polite site crawler; honours robots.txt)"
);

/// Desktop browser agents used when the config asks to impersonate one.
pub const IMPERSONATE_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_6) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.5 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:140.0) Gecko/20100101 Firefox/140.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36 Edg/138.0.0.0",
];

/// What the `user_agent` config value asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
enum AgentChoice<'a> {
    Crawler,
    Impersonate,
    Literal(&'a str),
}

impl<'a> AgentChoice<'a> {
    fn from_config(value: Option<&'a str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => AgentChoice::Crawler,
            Some(v) if v.eq_ignore_ascii_case("impersonate") => AgentChoice::Impersonate,
            Some(v) => AgentChoice::Literal(v),
        }
    }
}

/// Turn the configured value into the header actually sent.
///
/// `None` or blank gives [`USER_AGENT`], `"impersonate"` picks one of
/// [`IMPERSONATE_USER_AGENTS`] at random, anything else is used verbatim.
pub fn resolve_user_agent(config: Option<&str>) -> String {
    match AgentChoice::from_config(config) {
        AgentChoice::Crawler => USER_AGENT.to_string(),
        AgentChoice::Impersonate => {
            let pick = uuid::Uuid::new_v4().as_bytes()[0] as usize;
            IMPERSONATE_USER_AGENTS[pick % IMPERSONATE_USER_AGENTS.len()].to_string()
        }
        AgentChoice::Literal(agent) => agent.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_means_crawler_agent() {
        assert_eq!(resolve_user_agent(None), USER_AGENT);
        assert_eq!(resolve_user_agent(Some("  ")), USER_AGENT);
        assert!(USER_AGENT.starts_with("sitecrawl/"));
    }

    #[test]
    fn test_impersonate_picks_browser() {
        for value in ["impersonate", "Impersonate"] {
            let ua = resolve_user_agent(Some(value));
            assert!(IMPERSONATE_USER_AGENTS.contains(&ua.as_str()));
        }
    }

    #[test]
    fn test_literal_is_trimmed() {
        assert_eq!(resolve_user_agent(Some(" MyBot/1.0 ")), "MyBot/1.0");
    }
}
