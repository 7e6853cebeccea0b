use padfuster::{Encoding, LocalOracle, TargetServer};

const ADDRESS: &str = "127.0.0.1:4567";
const SECRET: &[u8] = b"This is a sample message: the padding oracle says hi";

#[tokio::main]
async fn main() {
    let oracle = LocalOracle::with_random_key();
    let iv: [u8; 16] = rand::random();
    let token = Encoding::Base64.encode(&oracle.encrypt(SECRET, &iv));
    let server = TargetServer::new(oracle, Encoding::Base64);

    let listener = tokio::net::TcpListener::bind(ADDRESS).await.unwrap();
    println!("Listening on http://{}", ADDRESS);
    println!("Sample token: {}", token);
    println!(
        "Try: padfuster 'http://{}/check?token={}' -S '{}'",
        ADDRESS,
        padfuster::url_encode(&token),
        padfuster::url_encode(&token)
    );
    axum::serve(listener, server.router()).await.unwrap();
}
