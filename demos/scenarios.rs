use std::time::Instant;

use argh::FromArgs;
use brkmalloc::{Fit, Heap, Sbrk};
use libc::sbrk;

/// Drives an sbrk-backed heap through a fixed set of allocation scenarios
/// and prints the heap statistics at the end.
#[derive(FromArgs)]
struct Args {
  /// placement policy: first, best, worst or next
  #[argh(option, default = "Fit::DEFAULT")]
  fit: Fit,

  /// only run the scenario with this number (1-8)
  #[argh(option)]
  only: Option<usize>,
}

type SbrkHeap = Heap<Sbrk>;

/// Prints the current program break using `sbrk(0)`.
fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

fn simple_malloc_and_free(heap: &mut SbrkHeap) {
  println!("1 - Running test 1: Simple malloc and free");

  let ptr = heap.allocate(65535).unwrap();
  unsafe { heap.release(ptr.as_ptr()) };
}

fn exercise_malloc_and_free(heap: &mut SbrkHeap) {
  println!("2 - Running test 2: Exercise malloc and free");

  let ptr = heap.allocate(65535).unwrap();
  let ptrs: Vec<_> = (0..1024).map(|_| heap.allocate(1024).unwrap()).collect();

  unsafe {
    heap.release(ptr.as_ptr());
    for ptr in ptrs.iter().step_by(2) {
      heap.release(ptr.as_ptr());
    }

    let ptr = heap.allocate(65535).unwrap();
    heap.release(ptr.as_ptr());
  }
}

fn coalesce(heap: &mut SbrkHeap) {
  println!("3 - Running test 3: Test coalesce");

  unsafe {
    let ptr1 = heap.allocate(1200).unwrap();
    let ptr2 = heap.allocate(1200).unwrap();

    heap.release(ptr1.as_ptr());
    heap.release(ptr2.as_ptr());

    let ptr3 = heap.allocate(2048).unwrap();
    heap.release(ptr3.as_ptr());
  }
}

fn split_and_reuse(heap: &mut SbrkHeap) {
  println!("4 - Running test 4: Block split and reuse");

  unsafe {
    let ptr1 = heap.allocate(2048).unwrap();
    heap.release(ptr1.as_ptr());

    let ptr2 = heap.allocate(1024).unwrap();
    heap.release(ptr2.as_ptr());
  }
}

fn best_and_worst_fit(heap: &mut SbrkHeap) {
  println!("BFWF - Running test 5: Best fit and worst fit");

  let large = heap.allocate(65535).unwrap();
  let _buffer1 = heap.allocate(1).unwrap();
  let _middle = heap.allocate(65).unwrap();
  let _buffer2 = heap.allocate(1).unwrap();
  let medium = heap.allocate(6000).unwrap();

  println!("Worst fit should pick this one: {large:?}");
  println!("Best fit should pick this one: {medium:?}");

  unsafe {
    heap.release(large.as_ptr());
    heap.release(medium.as_ptr());
  }

  let chosen = heap.allocate(1000).unwrap();
  println!("Chosen address: {chosen:?}");
}

fn zero_allocate(heap: &mut SbrkHeap) {
  println!("Calloc - Running test 6");

  let array = heap
    .zero_allocate(5, size_of::<i32>())
    .unwrap()
    .cast::<i32>();

  unsafe {
    for i in 0..5 {
      assert_eq!(array.add(i).read_unaligned(), 0);
    }
    println!("calloc test PASSED");

    heap.release(array.as_ptr().cast());
  }
}

fn first_and_next_fit(heap: &mut SbrkHeap) {
  println!("FFNF - Running test 7: First fit and next fit");

  let low = heap.allocate(1000).unwrap();
  let sizes = [1, 10, 1, 6000, 1, 10, 1];
  let others: Vec<_> = sizes.iter().map(|&size| heap.allocate(size).unwrap()).collect();
  let high = heap.allocate(1000).unwrap();

  println!("First fit should pick this one: {low:?}");
  println!("Next fit should pick this one: {high:?}");

  unsafe {
    heap.release(low.as_ptr());
    heap.release(others[3].as_ptr());
    heap.release(high.as_ptr());
  }

  let _refill = heap.allocate(6000).unwrap();
  let chosen = heap.allocate(1000).unwrap();
  println!("Chosen address: {chosen:?}");
}

fn reallocate(heap: &mut SbrkHeap) {
  println!("Realloc - Running test 8");

  unsafe {
    let ptr = heap.allocate(size_of::<i32>() * 2).unwrap().cast::<i32>();
    ptr.write_unaligned(10);
    ptr.add(1).write_unaligned(20);

    let moved = heap
      .reallocate(ptr.as_ptr().cast(), size_of::<i32>() * 3)
      .unwrap()
      .cast::<i32>();
    moved.add(2).write_unaligned(30);

    for i in 0..3 {
      assert_eq!(moved.add(i).read_unaligned(), (i as i32 + 1) * 10);
    }
    println!("realloc test PASSED");

    heap.release(moved.as_ptr().cast());
  }
}

const SCENARIOS: [fn(&mut SbrkHeap); 8] = [
  simple_malloc_and_free,
  exercise_malloc_and_free,
  coalesce,
  split_and_reuse,
  best_and_worst_fit,
  zero_allocate,
  first_and_next_fit,
  reallocate,
];

fn main() {
  env_logger::init();

  let args: Args = argh::from_env();
  let mut heap = Heap::new(Sbrk::new(), args.fit);

  println!("placement policy: {}", heap.fit());
  print_program_break("start");

  for (index, scenario) in SCENARIOS.iter().enumerate() {
    let number = index + 1;
    if args.only.is_some_and(|only| only != number) {
      continue;
    }

    let start = Instant::now();
    scenario(&mut heap);
    let elapsed = start.elapsed();

    println!(
      "Test {} took {:.6} seconds to execute.\n",
      number,
      elapsed.as_secs_f64()
    );

    if let Err(err) = heap.validate() {
      eprintln!("heap corrupted after test {number}: {err}");
      std::process::exit(1);
    }
  }

  print_program_break("end");
  // Blocks still in use are reclaimed with the process.
  print!("{}", heap.stats());
}
