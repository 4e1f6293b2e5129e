use fibre_coalesce::{AsyncCoalescer, Context, MemoryStore};
use std::io;
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use tokio::time::{sleep, Duration};

// A simulated slow backend.
async fn fetch_from_database(key: i32, load_count: Arc<AtomicUsize>) -> io::Result<String> {
  println!(
    "--- Database: Received request for key {}. Simulating slow query...",
    key
  );
  load_count.fetch_add(1, Ordering::SeqCst);
  sleep(Duration::from_millis(500)).await;
  Ok(format!("value_for_{}", key))
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("fibre_coalesce=debug")),
    )
    .init();

  let load_counter = Arc::new(AtomicUsize::new(0));

  let coalescer = AsyncCoalescer::builder(MemoryStore::<i32, String>::new())
    .async_fetch({
      let counter = load_counter.clone();
      move |key: i32| fetch_from_database(key, counter.clone())
    })
    .build_async()
    .expect("Failed to build async coalescer");

  println!("--- Thundering Herd Demonstration ---");
  println!("Spawning 10 tasks to request the same key '42' at once.\n");

  let mut tasks = Vec::new();
  for i in 0..10 {
    let coalescer = coalescer.clone();
    tasks.push(tokio::spawn(async move {
      let value = coalescer
        .get(&Context::background(), &42)
        .await
        .expect("lookup failed");
      println!("[Task {}] Received value: {}", i, value);
      assert_eq!(value, "value_for_42");
    }));
  }

  for task in tasks {
    task.await.unwrap();
  }

  println!("\n--- Verification ---");
  println!(
    "Database function was called {} time(s).",
    load_counter.load(Ordering::SeqCst)
  );
  assert_eq!(load_counter.load(Ordering::SeqCst), 1);

  println!("\n--- Second Request ---");
  let value = coalescer.get(&Context::background(), &42).await.unwrap();
  println!("Received value: {} (cache hit)", value);
  assert_eq!(load_counter.load(Ordering::SeqCst), 1);

  println!("\nCoalescer metrics: {:#?}", coalescer.metrics());
}
