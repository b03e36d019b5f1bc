// SPDX-License-Identifier: GPL-3.0-or-later

use langsettings::{args, config, context, modes};
use std::process::ExitCode;

fn main() -> anyhow::Result<ExitCode> {
    env_logger::init();
    log::info!(
        "{} v{} on {}/{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    );

    let context = context::Context::capture()?;
    log::info!("{context}");
    let arguments = args::Arguments::try_from(args::cli().get_matches())?;
    log::info!("{arguments}");
    let configuration = config::Loader::load(&context, &arguments.config)?;
    log::info!("{configuration}");

    let mode = modes::Mode::configure(context, arguments, configuration)?;
    let exit_code = mode.run();
    log::debug!("Finished with {exit_code:?}");

    Ok(exit_code)
}
