// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT
use clap::Parser;

#[derive(Debug, clap::Parser)]
#[command(long_about = None)]
struct Args {
    #[arg(short, long, default_value_t = String::from("worker.toml"))]
    config_file: String,
    #[arg(short, long, default_value_t = String::from(""))]
    template: String,
}

fn read_conf_from_file(filename: &str) -> anyhow::Result<funclet_worker::FuncletWorkerSettings> {
    Ok(toml::from_str::<funclet_worker::FuncletWorkerSettings>(&std::fs::read_to_string(
        filename,
    )?)?)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();

    // Create a template worker configuration and exit.
    if !args.template.is_empty() {
        funclet_api::util::create_template(&args.template, funclet_worker::funclet_worker_default_conf().as_str())?;
        return Ok(());
    }

    // Read the configuration file.
    let conf = read_conf_from_file(&args.config_file);

    let async_runtime = tokio::runtime::Builder::new_multi_thread().worker_threads(8).enable_all().build()?;
    let async_tasks = vec![async_runtime.spawn(funclet_worker::funclet_worker_main(conf?))];

    async_runtime.block_on(async { futures::future::join_all(async_tasks).await });
    Ok(())
}
