use anyhow::Result;

fn main() -> Result<()> {
    provfn::cli::run()
}
