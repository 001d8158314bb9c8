use std::path::Path;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info};

use crate::app::banner::{self, BannerMode, DEFAULT_BANNER};
use crate::app::lifecycle::{wait_for_signals, ShutdownHandle};
use crate::container::context::ApplicationContext;
use crate::errors::BeanError;
use crate::properties::expr::parse_literal;
use crate::properties::{LayeredProperties, Properties};

/// Lifecycle listener collected from the wired context at startup.
#[async_trait]
pub trait ApplicationEvent: Send + Sync {
    async fn on_start(&self, ctx: &ApplicationContext) -> Result<(), BeanError>;
    async fn on_stop(&self, ctx: &ApplicationContext);
}

/// One-shot task run after wiring, before the start events.
#[async_trait]
pub trait CommandLineRunner: Send + Sync {
    async fn run(&self, ctx: &ApplicationContext) -> Result<(), BeanError>;
}

type PrepareHook = Box<dyn FnOnce(&mut ApplicationContext) -> Result<(), BeanError> + Send>;

/// Process-level wrapper around an [`ApplicationContext`]: layered
/// configuration loading, banner, signal handling, and the blocking run loop.
pub struct Application {
    context: ApplicationContext,
    config_locations: Vec<String>,
    banner: Option<String>,
    banner_mode: BannerMode,
    env_patterns: Vec<String>,
    after_prepare: Vec<PrepareHook>,
    shutdown: ShutdownHandle,
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

impl Application {
    pub fn new() -> Self {
        Self {
            context: ApplicationContext::new(),
            config_locations: vec!["config/".to_string()],
            banner: None,
            banner_mode: BannerMode::Console,
            env_patterns: vec![".*".to_string()],
            after_prepare: Vec::new(),
            shutdown: ShutdownHandle::new(),
        }
    }

    pub fn context_mut(&mut self) -> &mut ApplicationContext {
        &mut self.context
    }

    pub fn context(&self) -> &ApplicationContext {
        &self.context
    }

    pub fn add_config_location(mut self, location: impl Into<String>) -> Self {
        self.config_locations.push(location.into());
        self
    }

    pub fn with_banner(mut self, text: impl Into<String>) -> Self {
        self.banner = Some(text.into());
        self
    }

    pub fn with_banner_mode(mut self, mode: BannerMode) -> Self {
        self.banner_mode = mode;
        self
    }

    /// Replace the allow-list of environment variable name patterns.
    pub fn expect_env_patterns(mut self, patterns: Vec<String>) -> Self {
        self.env_patterns = patterns;
        self
    }

    /// Hook run after configuration is prepared, before wiring.
    pub fn after_prepare(
        mut self,
        hook: impl FnOnce(&mut ApplicationContext) -> Result<(), BeanError> + Send + 'static,
    ) -> Self {
        self.after_prepare.push(Box::new(hook));
        self
    }

    /// Handle for requesting shutdown from outside the run loop.
    pub fn handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Start the application and block until a termination signal or an
    /// explicit `shutdown` call, then notify the stop listeners in order.
    pub async fn run(mut self) -> Result<(), BeanError> {
        init_tracing();
        self.print_banner();
        let args: Vec<String> = std::env::args().skip(1).collect();
        let env: Vec<(String, String)> = std::env::vars().collect();
        self.prepare(&args, &env)?;
        for hook in std::mem::take(&mut self.after_prepare) {
            hook(&mut self.context)?;
        }
        self.context.auto_wire()?;
        info!(profile = %self.context.profile(), "application started");

        for runner in self.context.get_beans::<dyn CommandLineRunner>() {
            runner.run(&self.context).await?;
        }
        let events = self.context.get_beans::<dyn ApplicationEvent>();
        for event in &events {
            event.on_start(&self.context).await?;
        }

        tokio::spawn(wait_for_signals(self.shutdown.clone()));
        self.shutdown.wait().await;

        // teardown runs until the listeners return; no enforced deadline
        for event in &events {
            event.on_stop(&self.context).await;
        }
        info!("application stopped");
        Ok(())
    }

    fn print_banner(&self) {
        if self.banner_mode != BannerMode::Console {
            return;
        }
        let text = match &self.banner {
            Some(text) => text.clone(),
            None => self
                .config_locations
                .iter()
                .filter_map(|location| location_dir(location).ok())
                .find_map(|dir| std::fs::read_to_string(dir.join("banner.txt")).ok())
                .unwrap_or_else(|| DEFAULT_BANNER.to_string()),
        };
        banner::print(&text);
    }

    /// Load configuration in precedence order (highest first): code-set
    /// properties, command-line `-key value` arguments, allow-listed
    /// environment variables, `application-<profile>.yaml`,
    /// `application.yaml`.
    fn prepare(&mut self, args: &[String], env: &[(String, String)]) -> Result<(), BeanError> {
        let mut layered = LayeredProperties::new();
        layered.push(self.context.properties().clone());
        layered.push(parse_command_line(args));
        layered.push(filter_environment(env, &self.env_patterns)?);

        let profile = if self.context.profile().is_empty() {
            layered
                .get_first(&["sprout.profile", "SPROUT_PROFILE"])
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string()
        } else {
            self.context.profile().to_string()
        };
        if !profile.is_empty() {
            self.context.set_profile(profile.clone());
        }

        if !profile.is_empty() {
            for location in &self.config_locations {
                let dir = location_dir(location)?;
                if let Some(props) = load_config_file(dir, &format!("application-{profile}"))? {
                    layered.push(props);
                }
            }
        }
        for location in &self.config_locations {
            let dir = location_dir(location)?;
            if let Some(props) = load_config_file(dir, "application")? {
                layered.push(props);
            }
        }

        let flat = layered.flatten()?;
        for (key, value) in flat.iter() {
            self.context.set_property(key.clone(), value.clone());
        }
        debug!(keys = flat.len(), profile = %self.context.profile(), "configuration prepared");
        Ok(())
    }
}

/// Install a default subscriber honoring `RUST_LOG`; a no-op when the
/// embedding application already set one up.
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn location_dir(location: &str) -> Result<&Path, BeanError> {
    if let Some(rest) = location.strip_prefix("file:") {
        return Ok(Path::new(rest));
    }
    if let Some((scheme, _)) = location.split_once(':') {
        return Err(BeanError::configuration(format!(
            "unsupported configuration scheme \"{scheme}\""
        )));
    }
    Ok(Path::new(location))
}

fn load_config_file(dir: &Path, stem: &str) -> Result<Option<Properties>, BeanError> {
    for ext in ["yaml", "yml"] {
        let path = dir.join(format!("{stem}.{ext}"));
        if !path.exists() {
            continue;
        }
        let text = std::fs::read_to_string(&path)?;
        let doc: Value = serde_yaml::from_str(&text)?;
        let mut props = Properties::new();
        match doc {
            Value::Object(map) => {
                for (key, value) in map {
                    props.set(key, value);
                }
            }
            Value::Null => {}
            _ => {
                return Err(BeanError::configuration(format!(
                    "configuration file {} must contain a mapping",
                    path.display()
                )))
            }
        }
        debug!(path = %path.display(), "configuration file loaded");
        return Ok(Some(props));
    }
    Ok(None)
}

/// `-key value` pairs; a flag without a following value reads as `true`.
fn parse_command_line(args: &[String]) -> Properties {
    let mut props = Properties::new();
    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        let Some(key) = arg.strip_prefix('-') else { continue };
        if key.is_empty() {
            continue;
        }
        let value = match iter.peek() {
            Some(next) if !next.starts_with('-') => {
                iter.next().map(String::as_str).unwrap_or("true")
            }
            _ => "true",
        };
        props.set(key, parse_literal(value));
    }
    props
}

fn filter_environment(
    env: &[(String, String)],
    patterns: &[String],
) -> Result<Properties, BeanError> {
    let mut compiled = Vec::with_capacity(patterns.len());
    for pattern in patterns {
        let regex = Regex::new(pattern).map_err(|err| {
            BeanError::configuration(format!("invalid environment pattern \"{pattern}\": {err}"))
        })?;
        compiled.push(regex);
    }
    let mut props = Properties::new();
    for (key, value) in env {
        if compiled.iter().any(|regex| regex.is_match(key)) {
            props.set(key.clone(), parse_literal(value));
        }
    }
    Ok(props)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::definition::Bean;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_command_line_pairs_and_flags() {
        let args: Vec<String> = ["-server.port", "8080", "-debug", "-name", "worker"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let props = parse_command_line(&args);
        assert_eq!(props.get("server.port"), Some(&json!(8080)));
        assert_eq!(props.get("debug"), Some(&json!(true)));
        assert_eq!(props.get("name"), Some(&json!("worker")));
    }

    #[test]
    fn test_environment_allow_list() {
        let env = vec![
            ("APP_PORT".to_string(), "9090".to_string()),
            ("HOME".to_string(), "/root".to_string()),
        ];
        let props = filter_environment(&env, &["^APP_".to_string()]).unwrap();
        assert_eq!(props.get("APP_PORT"), Some(&json!(9090)));
        assert!(props.get("HOME").is_none());
    }

    #[test]
    fn test_invalid_environment_pattern_is_fatal() {
        let err = filter_environment(&[], &["[".to_string()]).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_unsupported_config_scheme_is_fatal() {
        let err = location_dir("s3:bucket/config").unwrap_err();
        assert!(err.is_configuration());
        assert!(location_dir("file:/etc/app").is_ok());
        assert!(location_dir("config/").is_ok());
    }

    struct Probe {
        starts: Arc<AtomicUsize>,
        stops: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ApplicationEvent for Probe {
        async fn on_start(&self, _ctx: &ApplicationContext) -> Result<(), BeanError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn on_stop(&self, _ctx: &ApplicationContext) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct StopRunner {
        handle: ShutdownHandle,
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CommandLineRunner for StopRunner {
        async fn run(&self, _ctx: &ApplicationContext) -> Result<(), BeanError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            // double request on purpose; the second must be a no-op
            self.handle.shutdown();
            self.handle.shutdown();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_run_executes_runners_and_events_exactly_once() {
        let starts = Arc::new(AtomicUsize::new(0));
        let stops = Arc::new(AtomicUsize::new(0));
        let runs = Arc::new(AtomicUsize::new(0));

        let mut app = Application::new()
            .with_banner_mode(BannerMode::Off)
            .expect_env_patterns(vec!["^SPROUT_".to_string()]);
        let handle = app.handle();
        app.context_mut().register(
            Bean::object(Probe {
                starts: starts.clone(),
                stops: stops.clone(),
            })
            .export::<dyn ApplicationEvent>(|probe| probe as Arc<dyn ApplicationEvent>),
        );
        app.context_mut().register(
            Bean::object(StopRunner {
                handle,
                runs: runs.clone(),
            })
            .export::<dyn CommandLineRunner>(|runner| runner as Arc<dyn CommandLineRunner>),
        );

        app.run().await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }
}
