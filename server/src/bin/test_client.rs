use shared::ids::*;
use shared::records::{BaseInfo, ChatMessage, Handshake, Position};
use shared::{
    Datagram, PluginManifest, ReadStream, WriteStream, DEFAULT_PASSWORD, MAX_DATAGRAM_SIZE,
    PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

async fn send(
    socket: &UdpSocket,
    server_addr: SocketAddr,
    datagram: &Datagram,
) -> Result<(), Box<dyn std::error::Error>> {
    socket.send_to(&datagram.encode()?, server_addr).await?;
    Ok(())
}

async fn send_frame(
    socket: &UdpSocket,
    server_addr: SocketAddr,
    frame: Vec<u8>,
) -> Result<(), Box<dyn std::error::Error>> {
    send(socket, server_addr, &Datagram::Message(frame)).await
}

/// Waits for the next datagram that is not a ping, answering pings on the way.
async fn recv(
    socket: &UdpSocket,
    server_addr: SocketAddr,
    buf: &mut [u8],
) -> Result<Option<Datagram>, Box<dyn std::error::Error>> {
    loop {
        let (len, _) = match timeout(Duration::from_secs(2), socket.recv_from(buf)).await {
            Ok(result) => result?,
            Err(_) => return Ok(None),
        };
        match Datagram::decode(&buf[..len])? {
            Datagram::Ping { timestamp } => {
                send(socket, server_addr, &Datagram::Pong { timestamp }).await?;
            }
            other => return Ok(Some(other)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let server_addr: SocketAddr = args.next().unwrap_or_else(|| "127.0.0.1:25565".to_string()).parse()?;
    let password = args.next().unwrap_or_else(|| DEFAULT_PASSWORD.to_string());

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    println!("Sending connection request to {}", server_addr);
    send(&socket, server_addr, &Datagram::Connect { protocol_version: PROTOCOL_VERSION }).await?;

    let guid = match recv(&socket, server_addr, &mut buf).await? {
        Some(Datagram::Accepted { guid }) => guid,
        other => {
            println!("Expected Accepted but got: {:?}", other);
            return Ok(());
        }
    };
    println!("Connection accepted with guid {:016x}", guid);

    // Plugin probe with an empty list
    let mut probe = WriteStream::new(ID_GAME_PREINIT, guid);
    probe.write(&PluginManifest::default())?;
    send_frame(&socket, server_addr, probe.into_bytes()).await?;

    match recv(&socket, server_addr, &mut buf).await? {
        Some(Datagram::Message(frame)) => {
            let mut stream = ReadStream::new(&frame)?;
            let required: PluginManifest = stream.read()?;
            if !required.is_empty() {
                println!("Server requires {} plugins:", required.len());
                for entry in required.iter() {
                    println!("  {} {:08X?}", entry.name, entry.hashes);
                }
                return Ok(());
            }
            println!("Plugin check passed");
        }
        other => {
            println!("Expected plugin reply but got: {:?}", other);
            return Ok(());
        }
    }

    // The first regular packet opens the session
    send_frame(&socket, server_addr, WriteStream::request(ID_LOADED, guid)).await?;
    match recv(&socket, server_addr, &mut buf).await? {
        Some(Datagram::Message(frame)) if frame.first() == Some(&ID_HANDSHAKE) => {
            println!("Server requested the handshake");
        }
        other => {
            println!("Expected handshake request but got: {:?}", other);
            return Ok(());
        }
    }

    let mut handshake = WriteStream::new(ID_HANDSHAKE, guid);
    handshake.write(&Handshake {
        name: "TestClient".to_string(),
        password,
    })?;
    send_frame(&socket, server_addr, handshake.into_bytes()).await?;
    send_frame(&socket, server_addr, WriteStream::request(ID_LOADED, guid)).await?;

    let mut base_info = WriteStream::new(ID_PLAYER_BASEINFO, guid);
    base_info.write(&BaseInfo {
        name: "TestClient".to_string(),
        race: "dark elf".to_string(),
        is_male: true,
        ..Default::default()
    })?;
    send_frame(&socket, server_addr, base_info.into_bytes()).await?;

    let mut chat = WriteStream::new(ID_CHAT_MESSAGE, guid);
    chat.write(&ChatMessage {
        text: "hello from the test client".to_string(),
    })?;
    send_frame(&socket, server_addr, chat.into_bytes()).await?;

    for i in 0..10 {
        let angle = i as f32 / 5.0;
        let mut position = WriteStream::new(ID_PLAYER_POSITION, guid);
        position.write(&Position {
            pos: [angle.sin() * 100.0, angle.cos() * 100.0, 0.0],
            rot: [0.0, 0.0, angle],
        })?;
        send_frame(&socket, server_addr, position.into_bytes()).await?;

        while let Ok(Ok((len, _))) =
            timeout(Duration::from_millis(100), socket.recv_from(&mut buf)).await
        {
            match Datagram::decode(&buf[..len]) {
                Ok(Datagram::Message(frame)) => {
                    let id = frame.first().copied().unwrap_or_default();
                    println!("Received {} ({} bytes)", packet_name(id), frame.len());
                }
                Ok(Datagram::Ping { timestamp }) => {
                    send(&socket, server_addr, &Datagram::Pong { timestamp }).await?;
                }
                Ok(Datagram::Disconnect) => {
                    println!("Server closed the connection");
                    return Ok(());
                }
                Ok(other) => println!("Unexpected datagram: {:?}", other),
                Err(e) => println!("Failed to decode datagram: {}", e),
            }
        }

        sleep(Duration::from_millis(500)).await;
    }

    println!("Sending disconnect request");
    send(&socket, server_addr, &Datagram::Disconnect).await?;
    println!("Test client finished");

    Ok(())
}
