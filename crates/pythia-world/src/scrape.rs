//! The scraper subprocess that produces parseable text for compiled modules.

use std::path::Path;

use futures::FutureExt;
use futures::future::BoxFuture;
use pythia_std::ImmutPath;
use pythia_vfs::ContentSource;

/// Launches the configured interpreter on the scrape helper script and
/// captures its stdout.
///
/// All failure modes (missing script, failed launch, non-zero exit,
/// non-UTF-8 output) degrade to empty content.
#[derive(Debug, Clone)]
pub struct Scraper {
    interpreter: Option<ImmutPath>,
    script: Option<ImmutPath>,
    /// The interpreter's library path, used as the working directory.
    working_dir: Option<ImmutPath>,
}

impl Scraper {
    /// Creates a scraper.
    pub fn new(
        interpreter: Option<ImmutPath>,
        script: Option<ImmutPath>,
        working_dir: Option<ImmutPath>,
    ) -> Self {
        Self {
            interpreter,
            script,
            working_dir,
        }
    }

    /// A scraper that always yields empty content.
    pub fn disabled() -> Self {
        Self {
            interpreter: None,
            script: None,
            working_dir: None,
        }
    }

    /// Scrapes one module.
    pub async fn scrape_module(&self, module_name: &str, module_path: Option<&Path>) -> String {
        let (Some(interpreter), Some(script)) = (&self.interpreter, &self.script) else {
            return String::new();
        };

        let mut cmd = tokio::process::Command::new(interpreter.as_ref());
        cmd.arg("-W")
            .arg("ignore")
            .arg("-B")
            .arg("-E")
            .arg(script.as_ref())
            .arg(module_name);
        if let Some(path) = module_path {
            cmd.arg(path);
        }
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir.as_ref());
        }

        match cmd.output().await {
            Ok(output) if output.status.success() => {
                String::from_utf8(output.stdout).unwrap_or_default()
            }
            Ok(output) => {
                log::warn!(
                    "scraping {module_name} failed with status {}",
                    output.status
                );
                String::new()
            }
            Err(err) => {
                log::warn!("scraper launch failed for {module_name}: {err}");
                String::new()
            }
        }
    }
}

impl ContentSource for Scraper {
    fn fetch(&self, module_name: &str, file_path: Option<&Path>) -> BoxFuture<'static, String> {
        let scraper = self.clone();
        let name = module_name.to_owned();
        let path = file_path.map(Path::to_path_buf);
        async move { scraper.scrape_module(&name, path.as_deref()).await }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_scraper_yields_empty() {
        let scraper = Scraper::disabled();
        assert_eq!(scraper.scrape_module("sys", None).await, "");
    }

    #[tokio::test]
    async fn test_failed_launch_yields_empty() {
        let scraper = Scraper::new(
            Some(Path::new("/no/such/python").into()),
            Some(Path::new("/no/such/scrape_module.py").into()),
            None,
        );
        assert_eq!(scraper.scrape_module("sys", None).await, "");
    }
}
