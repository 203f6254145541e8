//! Example device: registers the standard MOs and runs one session
//!
//! ```text
//! cargo run --example dm_client -- [--config client.json] [--ddf-dir demos/ddf]
//! ```
//!
//! Without `--config` the client talks to `http://localhost:9988/path`.

use std::path::PathBuf;

use omadm_client::mo::new_handle;
use omadm_client::{ClientConfig, DmClient, StaticDataMo};

const DEVINFO: &str = "urn:oma:mo:oma-dm-devinfo:1.2";
const DMACC: &str = "urn:oma:mo:oma-dm-dmacc:1.2";
const SESSIONINFO: &str = "urn:oma:mo:oma-sessioninfomo:1.0";
const FUMO: &str = "urn:oma:mo:oma-fumo:1.0";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from);
    let ddf_dir = args
        .iter()
        .position(|a| a == "--ddf-dir")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("demos/ddf"));

    let mut config = match &config_path {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig {
            device_id: "PlanB".into(),
            ..ClientConfig::default()
        },
    };
    config.dump_tree = true;

    let mut client = DmClient::new(config);

    let ddf = |name: &str| ddf_dir.join(name);
    client.register_ddf(DEVINFO, ddf("DevInfo.ddf"), Some("http://localhost/dummy.ddf"));
    client.register_ddf(DMACC, ddf("DMAcc.ddf"), None);
    client.register_ddf(SESSIONINFO, ddf("SessionInfo.ddf"), None);
    client.register_ddf(FUMO, ddf("Fumo.ddf"), None);

    let mut devinfo = StaticDataMo::from_ddf_file("devinfo", ddf("DevInfo.ddf"))?;
    devinfo.local_set_node("DevID", "PlanB", false);
    devinfo.local_set_node("Man", "Continental China", false);
    devinfo.local_set_node("Mod", "Smartroad ECU", false);
    devinfo.local_set_node("OEM", "Continental", false);
    devinfo.local_set_node("Ext/P0URL", "http://localhost", true);

    let mut sessinfo = StaticDataMo::from_ddf_file("sessioninfomo", ddf("SessionInfo.ddf"))?;
    sessinfo.local_set_node("CBT", "3", false);
    sessinfo.local_set_node("ROAMING", "2", false);

    let dmacc = StaticDataMo::from_ddf_file("dm-dmacc", ddf("DMAcc.ddf"))?;
    let fumo = new_handle(StaticDataMo::from_ddf_file("fumo", ddf("Fumo.ddf"))?);

    client.add_mo(DEVINFO, new_handle(devinfo), None);
    client.add_mo(DMACC, new_handle(dmacc), None);
    client.add_mo(SESSIONINFO, new_handle(sessinfo), None);
    // One FUMO instance serving two update targets
    client.add_mo(FUMO, fumo.clone(), Some("rootfs"));
    client.add_mo(FUMO, fumo, Some("apps"));

    let report = client.start_session(false);
    log::info!(
        "Session ended ({:?}) after {} P3 package(s)",
        report.end,
        report.p3_sent
    );

    client.shutdown();
    Ok(())
}
