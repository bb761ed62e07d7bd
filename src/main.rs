mod application;
mod http;

use application::Application;

const STATS_PORT: u16 = 8089;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ffmpeg_the_third::init().expect("FFmpeg init failed");

    let app = Application::bootstrap();
    let manager = app.manager.clone();

    let result = http::serve(manager, STATS_PORT).await;

    app.shutdown();
    result.map_err(anyhow::Error::from)
}
