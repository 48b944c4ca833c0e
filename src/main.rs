#[tokio::main]
async fn main() -> std::io::Result<()> {
    activity_booking_backend::run().await
}
