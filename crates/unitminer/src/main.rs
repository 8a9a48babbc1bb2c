use unitminer::ui::cli::{self, Cli};

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    unitminer::init(args.verbose);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    cli::run(args.command, &mut out)
}
