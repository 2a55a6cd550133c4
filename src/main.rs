use anyhow::Result;

mod app;
mod logging;

fn main() -> Result<()> {
    let args = cleanshift::cli::parse();
    app::run(args)
}
