use super::*;
use std::fmt::Write;

const ALL_SECTIONS: &[&str] = &["server", "clients", "stats", "keyspace", "commandstats"];

/// INFO 命令的文本报告；`section` 为 None 时输出全部，未知 section 输出为空
pub fn build_info_response(section: Option<&str>, ks: &Keyspace, metrics: &Metrics) -> String {
    let sections: Vec<&str> = match section {
        None | Some("all") | Some("everything") | Some("default") => ALL_SECTIONS.to_vec(),
        Some(s) => vec![s],
    };

    let mut response = String::new();

    for sec in sections {
        // 写入 String 不会失败
        let _ = match sec {
            "server" => write!(
                response,
                "# Server\ncrab_kv_version:{}\nos:{}\nuptime_in_seconds:{}\n",
                env!("CARGO_PKG_VERSION"),
                std::env::consts::OS,
                metrics.uptime().as_secs()
            ),
            "clients" => write!(
                response,
                "# Clients\nconnected_clients:{}\ntotal_connections:{}\n",
                metrics.connected_clients.load(Ordering::Relaxed),
                metrics.total_connections.load(Ordering::Relaxed)
            ),
            "stats" => write!(
                response,
                "# Stats\ntotal_commands_processed:{}\ntotal_error_replies:{}\nexpired_keys:{}\n",
                metrics.command_count.load(Ordering::Relaxed),
                metrics.error_count.load(Ordering::Relaxed),
                ks.expired_keys()
            ),
            "keyspace" => write!(
                response,
                "# Keyspace\nkeys:{}\nexpires:{}\n",
                ks.len(),
                ks.expiry.tracked()
            ),
            "commandstats" => {
                response.push_str("# Commandstats\n");
                metrics
                    .command_counts()
                    .into_iter()
                    .try_for_each(|(name, calls)| {
                        writeln!(response, "cmdstat_{}:calls={}", name.to_ascii_lowercase(), calls)
                    })
            }
            _ => Ok(()),
        };
    }

    response
}
