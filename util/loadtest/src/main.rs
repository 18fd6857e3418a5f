use goose::prelude::*;


#[tokio::main]
async fn main() -> Result<(), GooseError> {
    GooseAttack::initialize()?
        .register_scenario(scenario!("SampleUser")
            .register_transaction(transaction!(get_index))
        )
        .execute()
        .await?;

    Ok(())
}

async fn get_index(user: &mut GooseUser) -> TransactionResult {
    let _goose = user.get("/").await?;

    Ok(())
}
