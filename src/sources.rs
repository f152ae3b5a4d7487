use anyhow::Result;

use crate::config::Config;

/// `gtm sources`: list each configured source and what it will crawl.
pub fn list_sources(config: &Config) -> Result<()> {
    let hn = &config.crawl.hn;
    let reddit = &config.crawl.reddit;

    println!("{:<10} {:<10} {:>8}   ENDPOINT", "SOURCE", "STATUS", "QUERIES");
    println!(
        "{:<10} {:<10} {:>8}   {}",
        "hn",
        status(hn.enabled, hn.search_terms.len()),
        hn.search_terms.len(),
        hn.base_url
    );
    println!(
        "{:<10} {:<10} {:>8}   {}",
        "reddit",
        status(reddit.enabled, reddit.subreddits.len()),
        reddit.subreddits.len(),
        reddit.base_url
    );

    Ok(())
}

fn status(enabled: bool, queries: usize) -> &'static str {
    match (enabled, queries) {
        (false, _) => "DISABLED",
        (true, 0) => "NO QUERIES",
        (true, _) => "OK",
    }
}
