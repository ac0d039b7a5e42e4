use std::thread;
use std::time::Duration;

use satcart_core::sim::{HostPort, SimConsole};
use satcart_core::{Dispatcher, Handoff, checksum};
use satcart_lib::{Client, Error, StreamLink};

const RAM: u32 = 0x0600_0000;

/// Dispatcher on its own thread, serving until an execute arrives.
fn spawn_cartridge(console: SimConsole) -> (HostPort, thread::JoinHandle<(Handoff, SimConsole)>) {
    let port = console.host_port();
    let handle = thread::spawn(move || {
        let mut dispatcher = Dispatcher::new(console);
        let handoff = dispatcher.serve();
        (handoff, dispatcher.into_console())
    });
    (port, handle)
}

fn client(port: HostPort) -> Client<StreamLink<HostPort>> {
    Client::new(StreamLink::new(port)).with_response_timeout(Duration::from_secs(10))
}

#[test]
fn upload_then_download_round_trips() {
    let (port, cartridge) = spawn_cartridge(SimConsole::new(RAM, 0x10000));
    let mut client = client(port);

    let data: Vec<u8> = (0..1000u32).map(|i| (i * 7 + 3) as u8).collect();
    client.upload(RAM + 0x400, &data).unwrap();

    let mut back = vec![0u8; data.len()];
    client.download(RAM + 0x400, &mut back).unwrap();
    assert_eq!(back, data);

    client.execute(RAM + 0x8000, &[0x00, 0x09]).unwrap();
    let (handoff, console) = cartridge.join().unwrap();
    assert_eq!(handoff.entry(), RAM + 0x8000);
    assert_eq!(console.memory(RAM + 0x8000, 2), &[0x00, 0x09]);
}

#[test]
fn corrupted_upload_is_rejected() {
    let console = SimConsole::new(RAM, 0x1000);
    let mut port = console.host_port();
    let (_, cartridge) = spawn_cartridge(console);

    // hand-built frame: 200 bytes with a checksum the cartridge disagrees with
    let data = vec![0x5Au8; 200];
    let mut frame = vec![0x02];
    frame.extend_from_slice(&RAM.to_be_bytes());
    frame.extend_from_slice(&200u32.to_be_bytes());
    frame.extend_from_slice(&data);
    frame.push(checksum(&data) ^ 0x80);
    std::io::Write::write_all(&mut port, &frame).unwrap();

    let mut result = [0u8; 1];
    let mut link = StreamLink::new(port.clone());
    while satcart_lib::Link::read(&mut link, &mut result).unwrap() == 0 {}
    assert_eq!(result[0], 0x01);

    let mut client = client(port);
    client.execute(RAM + 0x100, &[0xFF]).unwrap();
    let (_, console) = cartridge.join().unwrap();
    assert_eq!(console.colors().iter().filter(|&&c| c == 0x001F).count(), 1);
}

#[test]
fn upload_past_end_of_ram_fails_on_the_host() {
    // the last 100 bytes fall outside RAM, so the cartridge reads back zeros
    let (port, cartridge) = spawn_cartridge(SimConsole::new(RAM, 0x1000));
    let mut client = client(port);

    let address = RAM + 0x1000 - 100;
    let err = client.upload(address, &[0x5A; 200]).unwrap_err();
    assert!(matches!(
        err,
        Error::UploadRejected { address: a, result: 0x01 } if a == address
    ));

    // a rejected execute upload leaves the cartridge serving
    let err = client.execute(address, &[0x5A; 200]).unwrap_err();
    assert!(matches!(err, Error::UploadRejected { .. }));

    client.execute(RAM, &[0x09]).unwrap();
    let (handoff, console) = cartridge.join().unwrap();
    assert_eq!(handoff.entry(), RAM);
    assert_eq!(console.calls(), &[] as &[u32]);
}

#[test]
fn download_to_file_through_the_cartridge() {
    let mut console = SimConsole::new(RAM, 0x1000);
    let image: Vec<u8> = (0..=255u8).collect();
    console.load(RAM + 0x20, &image);
    let (port, cartridge) = spawn_cartridge(console);
    let mut client = client(port);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ram.bin");
    client.download_to_file(&path, RAM + 0x20, 256).unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), image);

    client.execute(RAM, &[0x00]).unwrap();
    cartridge.join().unwrap();
}
