//! Route programmer that shells out to `ip netns exec <ns> ip route`

use crate::command::{CommandOutput, CommandRunner, ProcessRunner};
use async_trait::async_trait;
use director_core::{ResolvedRoute, RouteError, RouteOutcome, RouteProgrammer};
use std::time::Duration;
use tokio::time;
use tracing::{debug, info};

/// Where routes are installed
#[derive(Clone, Debug)]
pub struct NetnsConfig {
    /// Network namespace of the router
    pub router_namespace: String,
    /// Interface routed traffic leaves through
    pub egress_interface: String,
    /// Upper bound for one `ip` invocation
    pub command_timeout: Option<Duration>,
}

impl Default for NetnsConfig {
    fn default() -> Self {
        Self {
            router_namespace: "n1".to_string(),
            egress_interface: "lana_1".to_string(),
            command_timeout: Some(Duration::from_secs(30)),
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum RouteAction {
    Add,
    Del,
}

impl RouteAction {
    fn as_str(&self) -> &'static str {
        match self {
            RouteAction::Add => "add",
            RouteAction::Del => "del",
        }
    }
}

pub struct IpRouteProgrammer<R = ProcessRunner> {
    runner: R,
    config: NetnsConfig,
}

impl IpRouteProgrammer<ProcessRunner> {
    pub fn with_config(config: NetnsConfig) -> Self {
        Self::new(ProcessRunner, config)
    }
}

impl<R: CommandRunner> IpRouteProgrammer<R> {
    pub fn new(runner: R, config: NetnsConfig) -> Self {
        Self { runner, config }
    }

    /// `ip netns exec <ns> ip route <route_args...>`
    fn netns_args(&self, route_args: Vec<String>) -> Vec<String> {
        let mut args = vec![
            "netns".to_string(),
            "exec".to_string(),
            self.config.router_namespace.clone(),
            "ip".to_string(),
            "route".to_string(),
        ];
        args.extend(route_args);
        args
    }

    fn route_args(&self, action: RouteAction, route: &ResolvedRoute) -> Vec<String> {
        self.netns_args(vec![
            action.as_str().to_string(),
            route.destination().to_string(),
            "via".to_string(),
            route.next_hop.to_string(),
            "dev".to_string(),
            self.config.egress_interface.clone(),
        ])
    }

    async fn execute(&self, args: Vec<String>) -> Result<(String, CommandOutput), RouteError> {
        let command = format!("ip {}", args.join(" "));
        info!("Executing: {}", command);

        let run = self.runner.run("ip", &args);
        let result = match self.config.command_timeout {
            Some(timeout) => match time::timeout(timeout, run).await {
                Ok(result) => result,
                Err(_) => return Err(RouteError::Timeout { command, timeout }),
            },
            None => run.await,
        };

        match result {
            Ok(output) => {
                debug!("`{}` exited with {:?}", command, output.code);
                Ok((command, output))
            }
            Err(source) => Err(RouteError::Spawn { command, source }),
        }
    }

    /// Whether the route already installed for the destination uses the same
    /// next-hop and interface
    async fn installed_matches(&self, route: &ResolvedRoute) -> Result<(bool, String), RouteError> {
        let args = self.netns_args(vec!["show".to_string(), route.destination().to_string()]);
        let (command, output) = self.execute(args).await?;
        if !output.success() {
            return Err(failed(command, output));
        }

        let next_hop = route.next_hop.to_string();
        let matches = output.stdout.lines().any(|line| {
            field(line, "via") == Some(next_hop.as_str())
                && field(line, "dev") == Some(self.config.egress_interface.as_str())
        });
        Ok((matches, output.stdout.trim().to_string()))
    }
}

/// Value following `key` in an `ip route show` line
fn field<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let mut tokens = line.split_whitespace();
    tokens.by_ref().find(|token| *token == key)?;
    tokens.next()
}

fn already_present(output: &CommandOutput) -> bool {
    output.stderr.contains("File exists")
}

fn already_absent(output: &CommandOutput) -> bool {
    output.stderr.contains("No such process")
}

fn failed(command: String, output: CommandOutput) -> RouteError {
    RouteError::CommandFailed {
        command,
        code: output.code,
        stderr: output.stderr.trim().to_string(),
    }
}

#[async_trait]
impl<R: CommandRunner> RouteProgrammer for IpRouteProgrammer<R> {
    async fn apply(&self, route: &ResolvedRoute) -> Result<RouteOutcome, RouteError> {
        let (command, output) = self.execute(self.route_args(RouteAction::Add, route)).await?;
        if output.success() {
            return Ok(RouteOutcome::Applied);
        }
        if !already_present(&output) {
            return Err(failed(command, output));
        }

        let (matches, installed) = self.installed_matches(route).await?;
        if matches {
            Ok(RouteOutcome::AlreadyPresent)
        } else {
            Err(RouteError::CommandFailed {
                command,
                code: output.code,
                stderr: format!("{} (installed: {})", output.stderr.trim(), installed),
            })
        }
    }

    async fn retract(&self, route: &ResolvedRoute) -> Result<RouteOutcome, RouteError> {
        let (command, output) = self.execute(self.route_args(RouteAction::Del, route)).await?;
        if output.success() {
            Ok(RouteOutcome::Retracted)
        } else if already_absent(&output) {
            Ok(RouteOutcome::AlreadyAbsent)
        } else {
            Err(failed(command, output))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn output(code: i32, stdout: &str, stderr: &str) -> CommandOutput {
        CommandOutput {
            code: Some(code),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    /// Records invocations and answers them from a script; the last answer repeats
    struct ScriptedRunner {
        outputs: Mutex<VecDeque<CommandOutput>>,
        hang: bool,
        invocations: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl ScriptedRunner {
        fn answering(outputs: Vec<CommandOutput>) -> Self {
            Self {
                outputs: Mutex::new(outputs.into()),
                hang: false,
                invocations: Mutex::new(Vec::new()),
            }
        }

        fn exiting(code: i32, stderr: &str) -> Self {
            Self::answering(vec![output(code, "", stderr)])
        }

        fn hanging() -> Self {
            Self {
                hang: true,
                ..Self::exiting(0, "")
            }
        }

        fn commands(&self) -> Vec<String> {
            self.invocations
                .lock()
                .unwrap()
                .iter()
                .map(|(_, args)| args.join(" "))
                .collect()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
            self.invocations
                .lock()
                .unwrap()
                .push((program.to_string(), args.to_vec()));
            if self.hang {
                std::future::pending::<()>().await;
            }
            let mut outputs = self.outputs.lock().unwrap();
            let next = if outputs.len() > 1 {
                outputs.pop_front()
            } else {
                outputs.front().cloned()
            };
            Ok(next.unwrap())
        }
    }

    fn route() -> ResolvedRoute {
        ResolvedRoute {
            vip: "10.0.0.5".parse().unwrap(),
            next_hop: "10.0.0.1".parse().unwrap(),
            gateway_namespace: "ns1".to_string(),
        }
    }

    const FILE_EXISTS: &str = "RTNETLINK answers: File exists\n";

    #[tokio::test]
    async fn test_apply_invocation() {
        let programmer = IpRouteProgrammer::new(ScriptedRunner::exiting(0, ""), NetnsConfig::default());
        assert_eq!(programmer.apply(&route()).await.unwrap(), RouteOutcome::Applied);

        let invocations = programmer.runner.invocations.lock().unwrap();
        let (program, args) = &invocations[0];
        assert_eq!(program, "ip");
        assert_eq!(
            args.join(" "),
            "netns exec n1 ip route add 10.0.0.5/32 via 10.0.0.1 dev lana_1"
        );
    }

    #[tokio::test]
    async fn test_retract_invocation_uses_config() {
        let config = NetnsConfig {
            router_namespace: "router".to_string(),
            egress_interface: "eth9".to_string(),
            command_timeout: None,
        };
        let programmer = IpRouteProgrammer::new(ScriptedRunner::exiting(0, ""), config);
        assert_eq!(programmer.retract(&route()).await.unwrap(), RouteOutcome::Retracted);

        assert_eq!(
            programmer.runner.commands(),
            vec!["netns exec router ip route del 10.0.0.5/32 via 10.0.0.1 dev eth9"]
        );
    }

    #[tokio::test]
    async fn test_apply_identical_existing_route_is_idempotent() {
        let runner = ScriptedRunner::answering(vec![
            output(2, "", FILE_EXISTS),
            output(0, "10.0.0.5 via 10.0.0.1 dev lana_1 \n", ""),
        ]);
        let programmer = IpRouteProgrammer::new(runner, NetnsConfig::default());
        assert_eq!(programmer.apply(&route()).await.unwrap(), RouteOutcome::AlreadyPresent);
        assert_eq!(
            programmer.runner.commands()[1],
            "netns exec n1 ip route show 10.0.0.5/32"
        );
    }

    #[tokio::test]
    async fn test_apply_conflicting_existing_route_fails() {
        let runner = ScriptedRunner::answering(vec![
            output(2, "", FILE_EXISTS),
            output(0, "10.0.0.5 via 10.0.0.9 dev lana_1 \n", ""),
        ]);
        let programmer = IpRouteProgrammer::new(runner, NetnsConfig::default());
        match programmer.apply(&route()).await {
            Err(RouteError::CommandFailed { command, stderr, .. }) => {
                assert!(command.contains("route add 10.0.0.5/32"));
                assert!(stderr.contains("10.0.0.5 via 10.0.0.9 dev lana_1"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_apply_existing_route_on_other_interface_fails() {
        let runner = ScriptedRunner::answering(vec![
            output(2, "", FILE_EXISTS),
            output(0, "10.0.0.5 via 10.0.0.1 dev eth0 \n", ""),
        ]);
        let programmer = IpRouteProgrammer::new(runner, NetnsConfig::default());
        assert!(matches!(
            programmer.apply(&route()).await,
            Err(RouteError::CommandFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_shared_vip_second_add_and_del() {
        // two gateway namespaces fan out to the same vip and next-hop
        let shared = ResolvedRoute {
            gateway_namespace: "ns2".to_string(),
            ..route()
        };
        let runner = ScriptedRunner::answering(vec![
            output(0, "", ""),
            output(2, "", FILE_EXISTS),
            output(0, "10.0.0.5 via 10.0.0.1 dev lana_1 \n", ""),
            output(0, "", ""),
            output(2, "", "RTNETLINK answers: No such process\n"),
        ]);
        let programmer = IpRouteProgrammer::new(runner, NetnsConfig::default());

        assert_eq!(programmer.apply(&route()).await.unwrap(), RouteOutcome::Applied);
        assert_eq!(programmer.apply(&shared).await.unwrap(), RouteOutcome::AlreadyPresent);
        assert_eq!(programmer.retract(&route()).await.unwrap(), RouteOutcome::Retracted);
        assert_eq!(programmer.retract(&shared).await.unwrap(), RouteOutcome::AlreadyAbsent);
    }

    #[tokio::test]
    async fn test_retract_missing_route_is_success() {
        let programmer = IpRouteProgrammer::new(
            ScriptedRunner::exiting(2, "RTNETLINK answers: No such process\n"),
            NetnsConfig::default(),
        );
        assert_eq!(programmer.retract(&route()).await.unwrap(), RouteOutcome::AlreadyAbsent);
    }

    #[tokio::test]
    async fn test_retract_missing_interface_is_an_error() {
        let programmer = IpRouteProgrammer::new(
            ScriptedRunner::exiting(1, "Cannot find device \"lana_1\"\n"),
            NetnsConfig::default(),
        );
        match programmer.retract(&route()).await {
            Err(RouteError::CommandFailed { code, stderr, .. }) => {
                assert_eq!(code, Some(1));
                assert_eq!(stderr, "Cannot find device \"lana_1\"");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_other_failures_are_errors() {
        let programmer = IpRouteProgrammer::new(
            ScriptedRunner::exiting(2, "Error: Nexthop has invalid gateway.\n"),
            NetnsConfig::default(),
        );
        match programmer.apply(&route()).await {
            Err(RouteError::CommandFailed { code, stderr, .. }) => {
                assert_eq!(code, Some(2));
                assert_eq!(stderr, "Error: Nexthop has invalid gateway.");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_command_times_out() {
        let config = NetnsConfig {
            command_timeout: Some(Duration::from_secs(5)),
            ..NetnsConfig::default()
        };
        let programmer = IpRouteProgrammer::new(ScriptedRunner::hanging(), config);
        assert!(matches!(
            programmer.apply(&route()).await,
            Err(RouteError::Timeout { .. })
        ));
    }

    #[test]
    fn test_field_lookup() {
        let line = "10.0.0.5 via 10.0.0.1 dev lana_1 proto static";
        assert_eq!(field(line, "via"), Some("10.0.0.1"));
        assert_eq!(field(line, "dev"), Some("lana_1"));
        assert_eq!(field(line, "metric"), None);
    }
}
