//! Template substitution (in the engine) against callback substitution
//! (on the host, with offset correction).

use linre::prelude::*;

fn main() {
    divan::main();
}

fn subject(n: usize) -> String {
    "abbcdefabbbbca ".repeat(n)
}

#[divan::bench(args = [1, 100, 10_000])]
fn template(bencher: divan::Bencher, n: usize) {
    let re = Pattern::new("a(b+)").unwrap();
    let input = subject(n);

    bencher.bench_local(|| re.sub(r"<\1>", input.as_str()).unwrap());
}

#[divan::bench(args = [1, 100, 10_000])]
fn callback(bencher: divan::Bencher, n: usize) {
    let re = Pattern::new("a(b+)").unwrap();
    let input = subject(n);

    bencher.bench_local(|| {
        re.sub_with(|m| format!("<{}>", m.group(1).unwrap_or_default()), input.as_str())
            .unwrap()
    });
}

#[divan::bench(args = [1, 100, 10_000])]
fn finditer(bencher: divan::Bencher, n: usize) {
    let re = Pattern::new("a(b+)").unwrap();
    let input = subject(n);

    bencher.bench_local(|| re.finditer(input.as_str()).unwrap().count());
}
