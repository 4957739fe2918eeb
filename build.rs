extern crate skeptic;

fn main() {
    // Generate tests for the code examples in the README
    skeptic::generate_doc_tests(&["README.md"]);
}
