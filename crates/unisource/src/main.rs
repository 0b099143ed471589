fn main() -> anyhow::Result<()> {
    unisource::run()
}
