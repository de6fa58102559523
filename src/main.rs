fn main() -> anyhow::Result<()> {
    poolvault::cli::run()
}
