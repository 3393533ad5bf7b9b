#[tokio::main]
async fn main() {
    if let Err(e) = kpi_dashboard::run().await {
        eprintln!("kpi-dashboard: {e}");
        std::process::exit(1);
    }
}
