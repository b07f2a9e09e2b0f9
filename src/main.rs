#[tokio::main]
async fn main() {
    resolvedesk_lib::run().await
}
