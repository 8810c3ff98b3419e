// Compile and flash the controller firmware with arduino-cli
use std::ffi::OsString;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::sleep;
use tracing::info;

use crate::config::Config;
use crate::error::{Error, Result};

/// One arduino-cli invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub stage: &'static str,
    pub program: String,
    pub args: Vec<OsString>,
}

impl Step {
    async fn run(&self) -> Result<()> {
        info!("{} firmware...", self.stage);
        let status = Command::new(&self.program)
            .args(&self.args)
            .status()
            .await
            .map_err(|source| Error::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !status.success() {
            return Err(Error::Upload {
                stage: self.stage,
                status,
            });
        }
        Ok(())
    }
}

/// Builds and flashes the sketch the controller runs
#[derive(Debug, Clone)]
pub struct Uploader {
    compile: Step,
    upload: Step,
    settle: Duration,
}

impl Uploader {
    pub fn from_config(config: &Config) -> Self {
        let sketch = config.sketch_path.as_os_str().to_owned();

        let compile = Step {
            stage: "Compiling",
            program: config.cli.clone(),
            args: vec![
                "compile".into(),
                "--fqbn".into(),
                config.board.clone().into(),
                sketch.clone(),
            ],
        };
        let upload = Step {
            stage: "Uploading",
            program: config.cli.clone(),
            args: vec![
                "upload".into(),
                "-p".into(),
                config.port.clone().into(),
                "--fqbn".into(),
                config.board.clone().into(),
                sketch,
            ],
        };

        Self {
            compile,
            upload,
            settle: config.settle(),
        }
    }

    pub fn steps(&self) -> [&Step; 2] {
        [&self.compile, &self.upload]
    }

    /// Compile, upload, then give the board time to reboot
    pub async fn run(&self) -> Result<()> {
        for step in self.steps() {
            step.run().await?;
        }
        info!("Upload successful");
        sleep(self.settle).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_cli(cli: &str) -> Config {
        Config {
            cli: cli.to_string(),
            settle_ms: 0,
            ..Config::default()
        }
    }

    #[test]
    fn test_invocations() {
        let uploader = Uploader::from_config(&Config::default());
        let [compile, upload] = uploader.steps();

        assert_eq!(compile.program, "arduino-cli");
        assert_eq!(
            compile.args,
            ["compile", "--fqbn", "arduino:avr:mega", "/home/bee/Arduino/receive_motors"]
                .map(OsString::from)
        );
        assert_eq!(
            upload.args,
            [
                "upload",
                "-p",
                "/dev/ttyACM0",
                "--fqbn",
                "arduino:avr:mega",
                "/home/bee/Arduino/receive_motors"
            ]
            .map(OsString::from)
        );
    }

    #[tokio::test]
    async fn test_missing_cli() {
        let uploader = Uploader::from_config(&config_with_cli("arduino-cli-not-installed"));
        let err = uploader.run().await.unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_compile_stops_before_upload() {
        let uploader = Uploader::from_config(&config_with_cli("false"));
        let err = uploader.run().await.unwrap_err();
        assert!(matches!(err, Error::Upload { stage: "Compiling", .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_upload() {
        let uploader = Uploader::from_config(&config_with_cli("true"));
        assert!(uploader.run().await.is_ok());
    }
}
