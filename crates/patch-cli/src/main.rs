use std::collections::HashMap;
use std::str::FromStr;

use log::error;
use patch_domain::{ErrorReport, EventState, OnboardRequest, Resolution, ResolutionAcceptance};
use patchflow::{AppConfig, Reply, Services};

const USAGE: &str = "\
Uso: patchflow <comando> [opciones]
  onboard  --json '<OnboardRequest JSON>'
  apps     (--unit <UNIDAD> | --id <ID>)
  ingest   --unit <UNIDAD> --app <APP> --env <ENTORNO> --json '<ErrorReport JSON>'
  show     --id <EVENT_ID>
  events   --unit <UNIDAD>
  approve  --id <EVENT_ID>
  reject   --id <EVENT_ID>
  resolve  --id <EVENT_ID> --text <TXT> --confidence <F> --pr <URL> [--state RESOLVED]
  feedback --id <EVENT_ID> [--accept LIKE|DISLIKE] [--comment <TXT>]
  issues   --id <EVENT_ID> --ids <A-1,B-2>";

/// `--clave valor` a partir del segundo argumento.
struct Flags(HashMap<String, String>);

impl Flags {
    fn parse(args: &[String]) -> Self {
        let mut map = HashMap::new();
        let mut i = 0;
        while i < args.len() {
            if let Some(key) = args[i].strip_prefix("--") {
                if let Some(value) = args.get(i + 1) {
                    map.insert(key.to_string(), value.clone());
                    i += 1;
                }
            }
            i += 1;
        }
        Flags(map)
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    fn require(&self, key: &str) -> Result<&str, String> {
        self.get(key).ok_or_else(|| format!("falta --{key}"))
    }

    fn parsed<T: FromStr>(&self, key: &str) -> Result<T, String>
        where T::Err: std::fmt::Display
    {
        self.require(key)?.parse().map_err(|e| format!("--{key}: {e}"))
    }
}

fn main() {
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1).cloned() else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };
    let flags = Flags::parse(&args[2..]);

    let cfg = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("[patchflow] configuración inválida: {e}");
            std::process::exit(5);
        }
    };
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("[patchflow] runtime: {e}");
            std::process::exit(5);
        }
    };
    let services = Services::postgres(&cfg, runtime.handle().clone());

    let reply = match dispatch(&services, &command, &flags) {
        Ok(r) => r,
        Err(msg) => {
            eprintln!("[patchflow {command}] {msg}\n{USAGE}");
            std::process::exit(2);
        }
    };
    println!("{}", serde_json::to_string_pretty(&reply.body).unwrap_or_else(|_| reply.body.to_string()));
    services.shutdown();
    // Los trabajos lanzados no sobreviven al proceso: sin garantía de entrega.
    runtime.shutdown_background();

    let code = match reply.status {
        200..=299 => 0,
        400..=499 => 4,
        _ => {
            error!("command:failed command={command} status={}", reply.status);
            5
        }
    };
    std::process::exit(code);
}

fn dispatch(services: &Services, command: &str, flags: &Flags) -> Result<Reply, String> {
    let reply = match command {
        "onboard" => {
            let req: OnboardRequest = serde_json::from_str(flags.require("json")?).map_err(|e| format!("JSON: {e}"))?;
            services.applications.onboard(req)
        }
        "apps" => match (flags.get("id"), flags.get("unit")) {
            (Some(_), _) => services.applications.get(flags.parsed("id")?),
            (None, Some(unit)) => services.applications.list_by_business_unit(unit),
            (None, None) => return Err("se requiere --unit o --id".into()),
        },
        "ingest" => {
            let report: ErrorReport = serde_json::from_str(flags.require("json")?).map_err(|e| format!("JSON: {e}"))?;
            services.events.ingest(report, flags.require("unit")?, flags.require("app")?, flags.require("env")?)
        }
        "show" => services.events.get(flags.parsed("id")?),
        "events" => services.events.list_by_business_unit(flags.require("unit")?),
        "approve" => services.events.approve(flags.parsed("id")?),
        "reject" => services.events.reject(flags.parsed("id")?),
        "resolve" => {
            let resolution = Resolution { text: flags.require("text")?.to_string(),
                                          confidence: flags.parsed("confidence")?,
                                          pull_request_url: flags.require("pr")?.to_string() };
            let target = match flags.get("state") {
                Some(s) => EventState::from_str(s).map_err(|e| e.to_string())?,
                None => EventState::Resolved,
            };
            services.events.resolve(flags.parsed("id")?, &resolution, target)
        }
        "feedback" => {
            let acceptance = flags.get("accept")
                                  .map(ResolutionAcceptance::from_str)
                                  .transpose()
                                  .map_err(|e| e.to_string())?;
            services.events.feedback(flags.parsed("id")?, acceptance, flags.get("comment"))
        }
        "issues" => {
            let ids: Vec<String> = flags.require("ids")?.split(',').map(str::to_string).collect();
            services.events.affected_issues(flags.parsed("id")?, &ids)
        }
        other => return Err(format!("comando desconocido: {other}")),
    };
    Ok(reply)
}
