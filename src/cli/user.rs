use tabled::Table;

use crate::{
    Res,
    cli::{
        Context,
        session::{current_user, valid_token},
    },
    config,
    types::UserTableRow,
};

/// Shows the profile of the token's owner and where their backups are stored.
pub async fn user(ctx: &Context) -> Res<()> {
    let token = valid_token(ctx).await?;
    let user = current_user(ctx, &token).await?;

    let database = config::backup_database_path(&user.id);
    let followers = user.followers.map(|f| f.total.to_string());

    let rows: Vec<UserTableRow> = [
        ("Id", Some(user.id)),
        ("Name", user.display_name),
        ("E-Mail", user.email),
        ("Country", user.country),
        ("Product", user.product),
        ("Followers", followers),
        ("Uri", Some(user.uri)),
        ("Database", Some(database.display().to_string())),
    ]
    .into_iter()
    .map(|(field, value)| UserTableRow {
        field: field.to_string(),
        value: value.unwrap_or_else(|| "-".to_string()),
    })
    .collect();

    println!("{}", Table::new(rows));
    Ok(())
}
