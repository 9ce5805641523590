#[tokio::main]
async fn main() {
    if let Err(e) = akasia_lib::run_server().await {
        eprintln!("サーバーの起動に失敗しました: {e}");
        std::process::exit(1);
    }
}
