//! URL normalization command.

use console::style;

use crate::utils::url::{classify, normalize};

pub fn cmd_normalize(urls: &[String]) -> anyhow::Result<()> {
    for url in urls {
        match normalize(url) {
            Some(canonical) => {
                let category = classify(&canonical, None)
                    .map(|c| c.id())
                    .unwrap_or("unknown");
                println!("{}\t{}", canonical, style(category).dim());
            }
            None => println!("{} {}: not a valid URL", style("✗").red(), url),
        }
    }
    Ok(())
}
