// Manual check against a real output device:
//   cargo run -p soundroom-backend-cpal --example smoke -- <path-or-url>

use soundroom_backend_cpal::CpalBackend;
use soundroom_core::{EventKind, Instance, PlayerEvent};
use std::thread::sleep;
use std::time::Duration;

fn main() {
    let Some(location) = std::env::args().nth(1) else {
        eprintln!("usage: smoke <path-or-url>");
        std::process::exit(2);
    };

    let instance = Instance::new(CpalBackend::new());
    let player = match instance.open(location.as_str()) {
        Ok(player) => player,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };

    let _ = player.subscribe(EventKind::StateChanged, |event: &PlayerEvent| {
        log::info!("event: {:?}", event);
    });
    let _ = player.subscribe(EventKind::EndReached, |_: &PlayerEvent| {
        log::info!("end of track");
    });

    log::info!("duration: {:?}", player.duration());

    if let Err(e) = player.play() {
        log::error!("{}", e);
        std::process::exit(1);
    }
    sleep(Duration::from_secs(2));
    log::info!("position after 2s: {:?}", player.position());

    player.pause();
    sleep(Duration::from_secs(2));
    log::info!("position after pausing 2s: {:?}", player.position());

    if let Err(e) = player.play() {
        log::error!("{}", e);
    }
    if let Err(e) = player.set_volume(50) {
        log::error!("{}", e);
    }
    player.rewind();
    sleep(Duration::from_secs(3));
    log::info!("status: {:?}", player.status());

    player.close();
}
