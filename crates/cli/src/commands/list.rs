//! `sitecheck list` - show every suite under the test root

use std::path::Path;

use sitecheck_common::HarnessConfig;
use sitecheck_e2e::suites;

use crate::output;

pub fn execute(config_path: &Path) -> anyhow::Result<i32> {
    let config = HarnessConfig::load(config_path)?;

    let found = match suites::discover(&config.suites.root, "") {
        Ok(found) => found,
        Err(e) => {
            output::print_error(&e.to_string());
            return Ok(1);
        }
    };

    if found.is_empty() {
        output::print_info(&format!(
            "No suites in {}",
            config.suites.root.display()
        ));
        return Ok(0);
    }

    println!("📂 Suites in {}:", config.suites.root.display());
    for suite in &found {
        output::print_item(&suite.to_string());
    }
    Ok(0)
}
