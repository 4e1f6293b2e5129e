use fibre_coalesce::{Coalescer, Context, MemoryStore};
use std::io;
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use std::thread;
use std::time::Duration;

// A simulated slow backend.
fn query_database(key: &str, query_count: &AtomicUsize) -> io::Result<String> {
  println!("--- Database: query for '{}'. Simulating slow query...", key);
  query_count.fetch_add(1, Ordering::SeqCst);
  thread::sleep(Duration::from_millis(300));
  Ok(format!("profile_of_{}", key))
}

fn main() {
  let query_count = Arc::new(AtomicUsize::new(0));

  let coalescer = Coalescer::builder(MemoryStore::<String, String>::new())
    .fetch({
      let query_count = query_count.clone();
      move |key: String| query_database(&key, &query_count)
    })
    .time_to_live(Duration::from_secs(30))
    .build()
    .expect("Failed to build coalescer");

  println!("--- Cache Stampede Demonstration ---");
  println!("Spawning 10 threads that miss the cache for 'alice' at once.\n");

  let handles: Vec<_> = (0..10)
    .map(|i| {
      let coalescer = coalescer.clone();
      thread::spawn(move || {
        let value = coalescer
          .get(&Context::background(), &"alice".to_string())
          .expect("lookup failed");
        println!("[Thread {}] Received value: {}", i, value);
      })
    })
    .collect();

  for handle in handles {
    handle.join().unwrap();
  }

  println!("\n--- Verification ---");
  println!(
    "Database was queried {} time(s).",
    query_count.load(Ordering::SeqCst)
  );
  assert_eq!(query_count.load(Ordering::SeqCst), 1);

  println!("\n--- Impatient Caller ---");
  let ctx = Context::with_timeout(Duration::from_millis(50));
  let slow = {
    let coalescer = coalescer.clone();
    thread::spawn(move || coalescer.get(&Context::background(), &"bob".to_string()))
  };
  thread::sleep(Duration::from_millis(10));
  match coalescer.get(&ctx, &"bob".to_string()) {
    Ok(value) => println!("Impatient caller got {}", value),
    Err(err) => println!("Impatient caller gave up: {}", err),
  }
  println!("Patient caller got {}", slow.join().unwrap().expect("lookup failed"));

  println!("\nCoalescer metrics: {:#?}", coalescer.metrics());
}
