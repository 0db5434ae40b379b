use log::{error, info};

use proctorwatch::settings::Settings;
use proctorwatch::utils::logging;

#[tokio::main]
async fn main() {
    logging::init();
    info!("ProctorWatch starting up...");

    let settings_path = Settings::path_from_env();
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            error!("Failed to load settings: {err:#}");
            std::process::exit(1);
        }
    };

    if let Err(err) = proctorwatch::run(settings, settings_path).await {
        error!("{err:#}");
        std::process::exit(1);
    }
}
