use std::env;
use std::process;
use std::time::SystemTime;

use domain::adapters::memory_repo::InMemoryLinkStore;
use domain::normalize::LinkValidator;
use domain::params_hash::compute_params_hash;
use domain::path::RandomPathGenerator;
use domain::request::parse_long_durable_link;
use domain::service::DurableLinkService;
use domain::{Clock, CreateInput, TenantConfig};
use url::Url;

struct StdClock;
impl Clock for StdClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

fn print_usage() {
    eprintln!(
        "{}\n\nUsage:\n  domain create <long-durable-link> [--allow <domain>]... [--scheme <http|https>]\n  domain hash <long-durable-link>\n\nNotes:\n  - This demo CLI uses an in-memory store; data is not persisted across runs.\n  - The target link's domain is allowed by default; --allow replaces that.",
        domain::about()
    );
}

fn run() -> Result<(), String> {
    let mut args = env::args().skip(1); // skip program name

    let Some(cmd) = args.next() else {
        print_usage();
        return Ok(());
    };

    match cmd.as_str() {
        "create" => {
            let Some(long_link) = args.next() else {
                return Err("missing <long-durable-link> for create".into());
            };

            let mut allow: Vec<String> = Vec::new();
            let mut scheme = "https".to_string();
            let rest: Vec<String> = args.collect();
            let mut i = 0;
            while i < rest.len() {
                match rest[i].as_str() {
                    "--allow" => {
                        if i + 1 >= rest.len() {
                            return Err("--allow requires a domain".into());
                        }
                        allow.push(rest[i + 1].clone());
                        i += 2;
                    }
                    "--scheme" => {
                        if i + 1 >= rest.len() {
                            return Err("--scheme requires a value".into());
                        }
                        scheme = rest[i + 1].clone();
                        i += 2;
                    }
                    unk => {
                        return Err(format!("unknown argument: {}", unk));
                    }
                }
            }

            let svc = DurableLinkService::new(
                InMemoryLinkStore::new(),
                RandomPathGenerator::new(),
                StdClock,
                LinkValidator::new(),
            );
            let request = svc
                .prepare(CreateInput {
                    long_durable_link: Some(long_link),
                    ..CreateInput::default()
                })
                .map_err(|e| format!("invalid long link: {}", e))?;

            if allow.is_empty() {
                let target = Url::parse(&request.durable_link_info.link)
                    .map_err(|e| format!("invalid target link: {}", e))?;
                if let Some(host) = target.host_str() {
                    allow.push(host.to_string());
                }
            }
            let cfg = TenantConfig {
                url_scheme: scheme,
                domain_allow_list: allow,
                short_path_length: 4,
                unguessable_path_length: 17,
                default_ios_app_store_id: None,
                default_android_package: None,
            };

            let created = svc
                .create(request, None, &cfg)
                .map_err(|e| format!("create failed: {}", e))?;
            println!("short: {}", created.short_link);
            for w in &created.warnings {
                println!("warning: {:?}: {}", w.warning_code, w.warning_message);
            }
            let resolved = svc
                .resolve(&created.short_link, None, &cfg)
                .map_err(|e| format!("resolve failed: {}", e))?;
            println!("long:  {}", resolved.long_link);
            Ok(())
        }
        "hash" => {
            let Some(long_link) = args.next() else {
                return Err("missing <long-durable-link> for hash".into());
            };
            let request =
                parse_long_durable_link(&long_link).map_err(|e| format!("invalid long link: {}", e))?;
            println!("{}", compute_params_hash(&request.durable_link_info.params));
            Ok(())
        }
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn main() {
    if let Err(msg) = run() {
        eprintln!("error: {}", msg);
        process::exit(1);
    }
}
