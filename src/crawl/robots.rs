use moka::future::Cache;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::debug;

/// Parsed robots.txt rules for one origin. Only the rule groups that apply
/// to `*` or to our user agent are kept; longest-prefix match decides, with
/// Allow winning ties, matching the de-facto standard.
#[derive(Debug, Default)]
pub struct RobotsPolicy {
    rules: Vec<Rule>,
}

#[derive(Debug)]
struct Rule {
    allow: bool,
    prefix: String,
}

impl RobotsPolicy {
    pub fn parse(body: &str, user_agent: &str) -> Self {
        let ua = user_agent.to_lowercase();
        let mut rules = Vec::new();
        let mut group_applies = false;
        let mut in_group_header = false;

        for line in body.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((field, value)) = line.split_once(':') else {
                continue;
            };
            let field = field.trim().to_lowercase();
            let value = value.trim();

            match field.as_str() {
                "user-agent" => {
                    // Consecutive User-agent lines start one shared group.
                    if !in_group_header {
                        group_applies = false;
                        in_group_header = true;
                    }
                    let agent = value.to_lowercase();
                    if agent == "*" || ua.contains(&agent) {
                        group_applies = true;
                    }
                }
                "allow" | "disallow" => {
                    in_group_header = false;
                    if group_applies && !value.is_empty() {
                        rules.push(Rule {
                            allow: field == "allow",
                            prefix: value.to_string(),
                        });
                    } else if group_applies && field == "disallow" && value.is_empty() {
                        // "Disallow:" with no value means allow everything.
                    }
                }
                _ => {
                    in_group_header = false;
                }
            }
        }

        Self { rules }
    }

    pub fn allows(&self, path: &str) -> bool {
        let mut best: Option<(&Rule, usize)> = None;
        for rule in &self.rules {
            if path.starts_with(&rule.prefix) {
                let len = rule.prefix.len();
                let better = match best {
                    None => true,
                    Some((b, blen)) => len > blen || (len == blen && rule.allow && !b.allow),
                };
                if better {
                    best = Some((rule, len));
                }
            }
        }
        best.map(|(r, _)| r.allow).unwrap_or(true)
    }
}

/// Verdict cached per origin. `Permissive` covers both "no robots.txt" and
/// "robots.txt unfetchable".
#[derive(Clone)]
enum OriginRobots {
    Permissive,
    Policy(Arc<RobotsPolicy>),
}

fn robots_cache() -> &'static Cache<String, OriginRobots> {
    static CACHE: OnceLock<Cache<String, OriginRobots>> = OnceLock::new();
    CACHE.get_or_init(|| Cache::builder().max_capacity(10_000).build())
}

/// Check whether `url` may be fetched, consulting `/robots.txt` for the
/// URL's origin at most once per process.
pub async fn allowed(client: &reqwest::Client, url: &str, user_agent: &str) -> bool {
    let Ok(parsed) = url::Url::parse(url) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let origin = format!("{}://{}", parsed.scheme(), host);

    let ua = user_agent.to_string();
    let verdict = robots_cache()
        .get_with(origin.clone(), async {
            fetch_policy(client, &origin, &ua).await
        })
        .await;

    match verdict {
        OriginRobots::Permissive => true,
        OriginRobots::Policy(policy) => {
            let ok = policy.allows(parsed.path());
            if !ok {
                debug!("blocked by robots: {}", url);
            }
            ok
        }
    }
}

async fn fetch_policy(client: &reqwest::Client, origin: &str, user_agent: &str) -> OriginRobots {
    let robots_url = format!("{}/robots.txt", origin);
    let resp = client
        .get(&robots_url)
        .header("User-Agent", user_agent)
        .timeout(Duration::from_secs(5))
        .send()
        .await;

    match resp {
        Ok(r) if r.status().is_success() => match r.text().await {
            Ok(body) => OriginRobots::Policy(Arc::new(RobotsPolicy::parse(&body, user_agent))),
            Err(_) => OriginRobots::Permissive,
        },
        _ => OriginRobots::Permissive,
    }
}
