//! Store example with complex state

use bolsa::{middleware, Flow, Store};

#[derive(Clone, Debug)]
struct TodoItem {
    id: usize,
    text: String,
    completed: bool,
}

#[derive(Clone, Debug)]
struct AppState {
    todos: Vec<TodoItem>,
    filter: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), bolsa::StoreError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== Store Example ===\n");

    // Create a store with initial state
    let store = Store::builder(AppState {
        todos: vec![],
        filter: "all".to_string(),
    })
    .middleware(middleware::logger())
    .build();

    // Reject todos with empty text
    store.use_middleware(|state: AppState| {
        if state.todos.iter().any(|t| t.text.trim().is_empty()) {
            Flow::Abort("todo text must not be empty".to_string())
        } else {
            Flow::Continue(state)
        }
    });

    // Subscribe to state changes
    let subscription = store.subscribe(|state| {
        println!(
            "State updated! Active todos: {} (filter: {})",
            state.todos.iter().filter(|t| !t.completed).count(),
            state.filter
        );
    });

    // Add a todo
    println!("\nAdding todo...");
    store
        .update(|state| {
            state.todos.push(TodoItem {
                id: 1,
                text: "Learn Bolsa".to_string(),
                completed: false,
            });
        })
        .await?;

    // Try to add an invalid todo
    println!("\nAdding empty todo...");
    if let Err(e) = store
        .update(|state| {
            state.todos.push(TodoItem {
                id: 2,
                text: "  ".to_string(),
                completed: false,
            });
        })
        .await
    {
        println!("Rejected: {e}");
    }

    // Complete the todo
    println!("\nCompleting todo...");
    store
        .update(|state| {
            if let Some(todo) = state.todos.first_mut() {
                todo.completed = true;
            }
        })
        .await?;

    subscription.unsubscribe();

    // Read final state
    println!("\nFinal state: {:#?}", store.get());
    Ok(())
}
